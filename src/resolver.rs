//! Dotted-path reads/writes and `{{ }}` template rendering over a [`Context`].
//!
//! Ported from the original Python source's `_get_from_path`/`_set_to_path`
//! helpers (`original_source/src/illumo_flow/core.py`) into a pure, allocation-light
//! Rust implementation. Pure: no I/O, no node execution, operates only on
//! values already in memory.

use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::ResolverError;

/// `$ctx`, `$.`, or `$env` — selects the root a dotted path is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Context,
    Env,
}

/// Splits a leading scope token off a path expression, defaulting to the
/// context scope for bare paths (§4.1: "Bare `X` on writes → context root").
fn split_scope(path: &str) -> Result<(Scope, &str), ResolverError> {
    if let Some(rest) = path.strip_prefix("$ctx.") {
        Ok((Scope::Context, rest))
    } else if path == "$ctx" {
        Ok((Scope::Context, ""))
    } else if let Some(rest) = path.strip_prefix("$.") {
        Ok((Scope::Context, rest))
    } else if let Some(rest) = path.strip_prefix("$env.") {
        Ok((Scope::Env, rest))
    } else if let Some(rest) = path.strip_prefix('$') {
        Err(ResolverError::UnknownScope(format!("${rest}")))
    } else {
        Ok((Scope::Context, path))
    }
}

fn split_segments(rest: &str) -> Vec<&str> {
    rest.split('.').filter(|p| !p.is_empty()).collect()
}

/// The data the context root addresses reads/writes against: a plain JSON
/// object view over [`Context`]'s reserved keys plus its `data` bucket.
fn context_as_value(ctx: &Context) -> Value {
    serde_json::to_value(ctx).unwrap_or(Value::Object(Map::new()))
}

/// Reads a value out of a `serde_json::Value` tree by dotted segments.
/// Missing segments resolve to `Value::Null`, never an error — §4.1's "soft"
/// failure mode for reads.
fn get_path<'a>(root: &'a Value, segments: &[&str]) -> &'a Value {
    let mut current = root;
    for seg in segments {
        match current.get(seg) {
            Some(v) => current = v,
            None => return &Value::Null,
        }
    }
    current
}

/// Writes `value` into `root` at the dotted segments, creating intermediate
/// objects as needed.
fn set_path(root: &mut Value, segments: &[&str], value: Value) {
    if segments.is_empty() {
        *root = value;
        return;
    }
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    let map = root.as_object_mut().expect("just ensured object");
    let (head, tail) = (segments[0], &segments[1..]);
    if tail.is_empty() {
        map.insert(head.to_string(), value);
    } else {
        let entry = map
            .entry(head.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        set_path(entry, tail, value);
    }
}

/// Reads a pure path reference (`$ctx.a.b`, `$.a.b`, `$env.VAR`) against the
/// given context. Returns `Value::Null` for any missing segment.
pub fn read_path(ctx: &Context, path: &str) -> Result<Value, ResolverError> {
    let (scope, rest) = split_scope(path)?;
    let segments = split_segments(rest);
    match scope {
        Scope::Context => {
            let root = context_as_value(ctx);
            Ok(get_path(&root, &segments).clone())
        }
        Scope::Env => {
            if segments.len() != 1 {
                return Ok(Value::Null);
            }
            Ok(std::env::var(segments[0])
                .map(Value::String)
                .unwrap_or(Value::Null))
        }
    }
}

/// Writes `value` to a dotted path rooted at the context's `data` bucket
/// (reserved keys are owned by the scheduler/policy engine and are not
/// writable through this path, per §5's "Shared resources").
pub fn write_path(ctx: &mut Context, path: &str, value: Value) -> Result<(), ResolverError> {
    let (scope, rest) = split_scope(path)?;
    if scope == Scope::Env {
        return Err(ResolverError::UnknownScope("$env is read-only".to_string()));
    }
    let segments = split_segments(rest);
    let mut root = Value::Object(std::mem::take(&mut ctx.data));
    set_path(&mut root, &segments, value);
    ctx.data = match root {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Ok(())
}

/// Resolves `{{ expr }}` spans inside `template` against the context,
/// substituting each span's resolved value in its string form. Literal text
/// outside spans is preserved verbatim.
pub fn render_template(ctx: &Context, template: &str) -> Result<String, ResolverError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open
            .find("}}")
            .ok_or_else(|| ResolverError::MalformedTemplate(template.to_string()))?;
        let expr = after_open[..end].trim();
        let value = read_path(ctx, expr)?;
        out.push_str(&value_to_template_string(&value));
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn value_to_template_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// An input binding as declared on a node: a bare path, a template string,
/// or a mapping of independently-resolved paths (§4.1).
#[derive(Debug, Clone)]
pub enum InputBinding {
    Path(String),
    Template(String),
    Mapping(Vec<(String, String)>),
}

impl InputBinding {
    /// Builds a binding from a declarative config value: a bare path or
    /// template string, or an object mapping field names to paths (§4.3's
    /// `context.inputs`).
    pub fn from_config(value: &Value) -> Result<Self, ResolverError> {
        match value {
            Value::String(s) if s.contains("{{") => Ok(InputBinding::Template(s.clone())),
            Value::String(s) => Ok(InputBinding::Path(s.clone())),
            Value::Object(map) => {
                let mut fields = Vec::with_capacity(map.len());
                for (key, path) in map {
                    let path = path
                        .as_str()
                        .ok_or_else(|| ResolverError::MalformedTemplate(key.clone()))?;
                    fields.push((key.clone(), path.to_string()));
                }
                Ok(InputBinding::Mapping(fields))
            }
            other => Err(ResolverError::MalformedTemplate(other.to_string())),
        }
    }

    /// Resolves this binding against `ctx`, producing the node's input
    /// payload.
    pub fn resolve(&self, ctx: &Context) -> Result<Value, ResolverError> {
        match self {
            InputBinding::Path(path) => read_path(ctx, path),
            InputBinding::Template(template) => {
                render_template(ctx, template).map(Value::String)
            }
            InputBinding::Mapping(fields) => {
                let mut map = Map::new();
                for (key, path) in fields {
                    map.insert(key.clone(), read_path(ctx, path)?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

/// An output binding: write the whole result to one path, or scatter named
/// fields of a mapping result to separate paths (§4.1).
#[derive(Debug, Clone)]
pub enum OutputBinding {
    Path(String),
    Mapping(Vec<(String, String)>),
}

impl OutputBinding {
    /// Builds a binding from a declarative config value: a bare path, or an
    /// object mapping result fields to paths (§4.3's `context.outputs`).
    pub fn from_config(value: &Value) -> Result<Self, ResolverError> {
        match value {
            Value::String(s) => Ok(OutputBinding::Path(s.clone())),
            Value::Object(map) => {
                let mut fields = Vec::with_capacity(map.len());
                for (key, path) in map {
                    let path = path
                        .as_str()
                        .ok_or_else(|| ResolverError::MalformedTemplate(key.clone()))?;
                    fields.push((key.clone(), path.to_string()));
                }
                Ok(OutputBinding::Mapping(fields))
            }
            other => Err(ResolverError::MalformedTemplate(other.to_string())),
        }
    }

    pub fn apply(&self, ctx: &mut Context, result: &Value) -> Result<(), ResolverError> {
        match self {
            OutputBinding::Path(path) => write_path(ctx, path, result.clone()),
            OutputBinding::Mapping(fields) => {
                let obj = result
                    .as_object()
                    .ok_or(ResolverError::NonMappingOutput)?;
                for (result_key, path) in fields {
                    let value = obj.get(result_key).cloned().unwrap_or(Value::Null);
                    write_path(ctx, path, value)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn read_write_round_trip() {
        let mut ctx = Context::new();
        write_path(&mut ctx, "$.a.b", json!(42)).unwrap();
        assert_eq!(read_path(&ctx, "$ctx.a.b").unwrap(), json!(42));
        assert_eq!(read_path(&ctx, "$.a.b").unwrap(), json!(42));
    }

    #[test]
    fn reading_missing_path_is_null_not_error() {
        let ctx = Context::new();
        assert_eq!(read_path(&ctx, "$.nope.really").unwrap(), Value::Null);
    }

    #[test]
    fn env_scope_reads_process_env() {
        std::env::set_var("FLOWCORE_TEST_VAR", "hello");
        let ctx = Context::new();
        assert_eq!(
            read_path(&ctx, "$env.FLOWCORE_TEST_VAR").unwrap(),
            json!("hello")
        );
    }

    #[test]
    fn template_renders_embedded_paths() {
        let mut ctx = Context::new();
        write_path(&mut ctx, "$.name", json!("Ada")).unwrap();
        let rendered = render_template(&ctx, "hello {{ $.name }}!").unwrap();
        assert_eq!(rendered, "hello Ada!");
    }

    #[test]
    fn template_missing_path_is_empty_string() {
        let ctx = Context::new();
        let rendered = render_template(&ctx, "x={{ $.missing }}").unwrap();
        assert_eq!(rendered, "x=");
    }

    #[test]
    fn input_binding_from_config_detects_template() {
        let binding = InputBinding::from_config(&json!("prefix {{ $.name }}")).unwrap();
        assert!(matches!(binding, InputBinding::Template(_)));
    }

    #[test]
    fn input_binding_from_config_detects_mapping() {
        let binding = InputBinding::from_config(&json!({"country": "$.geo.country"})).unwrap();
        match binding {
            InputBinding::Mapping(fields) => assert_eq!(fields[0].0, "country"),
            _ => panic!("expected a mapping binding"),
        }
    }

    #[test]
    fn mapping_output_binding_scatters_fields() {
        let mut ctx = Context::new();
        let binding = OutputBinding::Mapping(vec![
            ("country".to_string(), "$.geo.country".to_string()),
            ("score".to_string(), "$.risk.score".to_string()),
        ]);
        binding
            .apply(&mut ctx, &json!({"country": "JP", "score": 0.2}))
            .unwrap();
        assert_eq!(read_path(&ctx, "$.geo.country").unwrap(), json!("JP"));
        assert_eq!(read_path(&ctx, "$.risk.score").unwrap(), json!(0.2));
    }
}
