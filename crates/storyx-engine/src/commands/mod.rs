//! Command orchestration layer.
//!
//! `apply_engine_command` writes through the store repositories;
//! `apply_engine_query` only reads.
//!
//! ## Logging Ownership
//!
//! The engine owns lifecycle logging for every command and query:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! Lower layers (store, core) use only `tracing::debug!()` for internal details.

#![allow(clippy::result_large_err)]

pub mod engine_command;
pub mod engine_query;

use storyx_core::errors::{ExError, ExErrorKind};
use storyx_core::{log_op_end, log_op_error, log_op_start};
use storyx_core_types::correlation::RequestContext;
use storyx_store::Result;

/// Project the request is scoped to.
///
/// # Errors
///
/// `ERR_INVALID_INPUT` if the context names no project.
fn project_of(ctx: &RequestContext) -> Result<&str> {
    ctx.project_id.as_deref().ok_or_else(|| {
        ExError::new(ExErrorKind::InvalidInput)
            .with_context(ctx)
            .with_message("request context has no project id")
    })
}

/// Run `f` between boundary log events, tagging its error with `op` and the
/// request's correlation ids
fn boundary<T>(
    op: &'static str,
    ctx: &RequestContext,
    f: impl FnOnce(&str) -> Result<T>,
) -> Result<T> {
    log_op_start!(
        op,
        request_id = %ctx.request_id,
        project_id = ctx.project_id.as_deref().unwrap_or_default()
    );
    let start = std::time::Instant::now();

    let result = project_of(ctx).and_then(f);

    let elapsed = start.elapsed().as_millis() as u64;
    match result {
        Ok(value) => {
            log_op_end!(op, duration_ms = elapsed, request_id = %ctx.request_id);
            Ok(value)
        }
        Err(e) => {
            log_op_error!(op, e.clone(), duration_ms = elapsed, request_id = %ctx.request_id);
            Err(e.with_op(op).with_context(ctx))
        }
    }
}
