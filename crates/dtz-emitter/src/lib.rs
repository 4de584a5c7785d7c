//! Residual JavaScript for the dtz compiler.
//!
//! Three pieces live here:
//! - the structural JS expression/statement model (`js`) - pure trees, no
//!   textual concerns;
//! - the cluster/template engine (`cluster`) - deduplicates structurally
//!   isomorphic residuals, turning differing literals into parameters;
//! - the printer (`printer`) - a deterministic walk producing JS text.

pub mod js;
pub use js::{JsBody, JsExpr, JsLit, JsPath, JsSeg, JsStmt};

pub mod cluster;
pub use cluster::{
    Cluster, ClusterError, ClusterMember, apply_template, cluster_statements, compare_js_exprs,
    compute_parameter_mapping, lit_at, signature,
};

pub mod printer;
pub use printer::{print_expr, print_program};
