//! Graph construction, the edge mini-language, and compilation (§3, §4.3).

pub mod builder;
pub mod compile;
pub mod config;
pub mod edges;

pub use builder::GraphBuilder;
pub use compile::Graph;
pub use config::{build_graph, GraphConfig, NodeConfig, NodeContextConfig};
pub use edges::{parse_edge_expr, EdgeStatement, GroupKind};
