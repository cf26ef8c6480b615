//! Recursive-descent parser for the edge mini-language (§4.3 "Edge grammar").
//!
//! Grammar, roughly:
//!   expr      := group ">>" group
//!   group     := id | "(" id ("&" id)* ")" | "(" id ("|" id)* ")"
//! `&` inside a group means "all of these must complete before the next
//! group" (a join); `|` means "the target set is these nodes individually"
//! (a fan-out, equivalent to writing separate `A >> B` / `A >> C` edges).
//! Mixing `&` and `|` within the same group is rejected. `<<` is never a
//! valid operator (Design Notes §9: "edges are always written left-to-right").

use crate::error::GraphCompileError;
use crate::types::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    /// A single node, or an `|`-separated fan-out set.
    Either(Vec<NodeId>),
    /// An `&`-separated join set: all members must complete before the next
    /// group's nodes become ready.
    All(Vec<NodeId>),
}

impl GroupKind {
    pub fn members(&self) -> &[NodeId] {
        match self {
            GroupKind::Either(ids) | GroupKind::All(ids) => ids,
        }
    }
}

/// One parsed `group >> group` edge statement, possibly chained
/// (`A >> B >> C` parses to two statements: `A >> B`, `B >> C`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeStatement {
    pub from: GroupKind,
    pub to: GroupKind,
}

/// Parses one edge expression such as `"classify >> (approve|deny)"` or
/// `"(geo & risk) >> merge"` into a sequence of pairwise edge statements.
pub fn parse_edge_expr(expr: &str) -> Result<Vec<EdgeStatement>, GraphCompileError> {
    if expr.contains("<<") {
        return Err(GraphCompileError::ReversedEdgeOperator(expr.to_string()));
    }
    let groups_text: Vec<&str> = expr.split(">>").map(str::trim).collect();
    if groups_text.len() < 2 {
        return Err(GraphCompileError::EdgeParse {
            expr: expr.to_string(),
            reason: "expected at least one `>>` operator".to_string(),
        });
    }
    if groups_text.iter().any(|g| g.is_empty()) {
        return Err(GraphCompileError::EdgeParse {
            expr: expr.to_string(),
            reason: "empty segment between `>>` operators".to_string(),
        });
    }

    let groups = groups_text
        .into_iter()
        .map(|g| parse_group(expr, g))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(groups
        .windows(2)
        .map(|pair| EdgeStatement {
            from: pair[0].clone(),
            to: pair[1].clone(),
        })
        .collect())
}

fn parse_group(full_expr: &str, text: &str) -> Result<GroupKind, GraphCompileError> {
    let trimmed = text.trim();
    let inner = if let Some(stripped) = trimmed.strip_prefix('(') {
        let stripped = stripped.strip_suffix(')').ok_or_else(|| GraphCompileError::EdgeParse {
            expr: full_expr.to_string(),
            reason: format!("unbalanced parentheses in `{trimmed}`"),
        })?;
        stripped
    } else {
        return Ok(GroupKind::Either(vec![parse_id(full_expr, trimmed)?]));
    };

    let has_and = inner.contains('&');
    let has_or = inner.contains('|');
    if has_and && has_or {
        return Err(GraphCompileError::EdgeParse {
            expr: full_expr.to_string(),
            reason: format!("cannot mix `&` and `|` in group `{trimmed}`"),
        });
    }

    if has_and {
        let ids = inner
            .split('&')
            .map(|s| parse_id(full_expr, s.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GroupKind::All(ids))
    } else {
        let ids = inner
            .split('|')
            .map(|s| parse_id(full_expr, s.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GroupKind::Either(ids))
    }
}

fn parse_id(full_expr: &str, text: &str) -> Result<NodeId, GraphCompileError> {
    if text.is_empty() {
        return Err(GraphCompileError::EdgeParse {
            expr: full_expr.to_string(),
            reason: "empty node id in group".to_string(),
        });
    }
    NodeId::new(text).map_err(|_| GraphCompileError::EdgeParse {
        expr: full_expr.to_string(),
        reason: format!("`{text}` is not a valid node id"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn linear_edge() {
        let statements = parse_edge_expr("A >> B").unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].from, GroupKind::Either(vec![id("A")]));
        assert_eq!(statements[0].to, GroupKind::Either(vec![id("B")]));
    }

    #[test]
    fn chained_edge_produces_pairwise_statements() {
        let statements = parse_edge_expr("A >> B >> C").unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].from, GroupKind::Either(vec![id("B")]));
        assert_eq!(statements[1].to, GroupKind::Either(vec![id("C")]));
    }

    #[test]
    fn fan_out_group() {
        let statements = parse_edge_expr("classify >> (approve|deny)").unwrap();
        assert_eq!(
            statements[0].to,
            GroupKind::Either(vec![id("approve"), id("deny")])
        );
    }

    #[test]
    fn join_group() {
        let statements = parse_edge_expr("(geo & risk) >> merge").unwrap();
        assert_eq!(
            statements[0].from,
            GroupKind::All(vec![id("geo"), id("risk")])
        );
    }

    #[test]
    fn rejects_reversed_operator() {
        assert!(parse_edge_expr("A << B").is_err());
    }

    #[test]
    fn rejects_mixed_operators_in_group() {
        assert!(parse_edge_expr("(geo & risk | extra) >> merge").is_err());
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(parse_edge_expr("A >> >> B").is_err());
    }

    #[test]
    fn rejects_invalid_id() {
        assert!(parse_edge_expr("2bad >> B").is_err());
    }
}
