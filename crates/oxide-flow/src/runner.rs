//! Flow execution.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use oxide_dal::{Connector, ExecKind, QueryContext, Record};

use crate::config::Services;
use crate::context::{CancelSignal, FlowContext};
use crate::error::{FlowError, Result};
use crate::result::ServiceResult;
use crate::step::{SqlArgs, Step, StepKind};

/// Deepest allowed chain of nested flows.
pub const MAX_DEPTH: usize = 16;

/// Runs flows against a set of services.
///
/// Each run gets its own [`FlowContext`]; steps run one after another and
/// share that context's connections, so every write of a run commits or
/// rolls back together.
pub struct FlowRunner {
    services: Arc<Services>,
    connector: Arc<dyn Connector>,
}

impl FlowRunner {
    /// Creates a runner.
    pub fn new(services: Arc<Services>, connector: Arc<dyn Connector>) -> Self {
        Self {
            services,
            connector,
        }
    }

    /// The services flows are resolved against.
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Runs a flow to completion and finalizes every connection it opened.
    pub async fn run(&self, flow: &str, input: Value, cancel: &CancelSignal) -> ServiceResult {
        info!(flow, "Running flow");
        let mut context = FlowContext::new();
        let outcome = self.execute(&mut context, flow, input, cancel).await;
        context.finalize().await;
        let result = ServiceResult::from(outcome);
        info!(
            flow,
            success = result.success,
            code = %result.code,
            "Flow finished"
        );
        result
    }

    /// Runs a flow on a tokio task.
    pub fn spawn(
        self: &Arc<Self>,
        flow: impl Into<String>,
        input: Value,
        cancel: CancelSignal,
    ) -> JoinHandle<ServiceResult> {
        let runner = Arc::clone(self);
        let flow = flow.into();
        tokio::spawn(async move { runner.run(&flow, input, &cancel).await })
    }

    /// Runs a flow inside an existing context without finalizing it. On
    /// failure every context is flagged for rollback.
    pub async fn execute(
        &self,
        context: &mut FlowContext,
        flow: &str,
        input: Value,
        cancel: &CancelSignal,
    ) -> Result<Value> {
        let outcome = self.run_flow(context, flow, input, cancel, 0).await;
        if outcome.is_err() {
            context.mark_errored();
        }
        outcome
    }

    fn run_flow<'a>(
        &'a self,
        context: &'a mut FlowContext,
        flow: &'a str,
        input: Value,
        cancel: &'a CancelSignal,
        depth: usize,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            if depth > MAX_DEPTH {
                return Err(FlowError::NestingTooDeep(MAX_DEPTH));
            }
            let definition = self.services.flow(flow)?;
            let mut state = Record::new().with("input", input);
            let mut last = Value::Null;

            for step in &definition.steps {
                if cancel.is_cancelled() {
                    warn!(flow, step = %step.name, "Flow cancelled");
                    return Err(FlowError::Cancelled);
                }
                let args = step.resolve_args(&state);
                debug!(flow, step = %step.name, kind = ?step.kind, service = %step.service, "Running step");

                let outcome = AssertUnwindSafe(self.run_step(context, step, args, cancel, depth))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        Err(FlowError::Panicked {
                            step: step.name.clone(),
                            message: panic_message(payload.as_ref()),
                        })
                    });
                let output = match outcome {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(flow, step = %step.name, error = %e, "Step failed");
                        context.mark_errored();
                        return Err(e);
                    }
                };
                state.set(step.name.clone(), output.clone());
                last = output;
            }
            Ok(last)
        }
        .boxed()
    }

    async fn run_step(
        &self,
        context: &mut FlowContext,
        step: &Step,
        args: Record,
        cancel: &CancelSignal,
        depth: usize,
    ) -> Result<Value> {
        match step.kind {
            StepKind::Sql => self.run_sql(context, step, args).await,
            StepKind::Function => self.services.functions.invoke(&step.service, &args),
            StepKind::Flow => {
                self.run_flow(context, &step.service, args.into_value(), cancel, depth + 1)
                    .await
            }
        }
    }

    async fn run_sql(&self, context: &mut FlowContext, step: &Step, args: Record) -> Result<Value> {
        let item = self.services.mapper.get(&step.service)?;
        let sql = self.services.mapper.resolve(&item.name)?;
        let args = SqlArgs::parse(args)?;

        let ctx = context
            .open(&item.connection, &self.services, self.connector.as_ref())
            .await?;
        if !item.read_only {
            ctx.ensure_transaction().await?;
        }

        let mut query = QueryContext::new(ctx.provider(), sql)
            .params(args.params)
            .sorts(args.sorts);
        if let Some(filter) = args.filter {
            query = query.filter(filter);
        }
        if let Some((index, size)) = args.page {
            query = query.page(index, size);
        }

        let conn = ctx.connection()?;
        let (data, statements) = if query.is_paged() {
            let page = query.page_rows(conn).await?;
            (serde_json::to_value(page)?, 2)
        } else {
            let data = match item.kind {
                ExecKind::Query => Value::Array(
                    query
                        .query(conn)
                        .await?
                        .into_iter()
                        .map(Record::into_value)
                        .collect(),
                ),
                ExecKind::Single => query
                    .single(conn)
                    .await?
                    .map_or(Value::Null, Record::into_value),
                ExecKind::Scalar => query.scalar(conn).await?,
                ExecKind::Execute => Value::from(query.execute(conn).await?),
            };
            (data, 1)
        };
        for _ in 0..statements {
            ctx.record_execution(item.read_only);
        }
        Ok(data)
    }
}

impl std::fmt::Debug for FlowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRunner")
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
