#![allow(dead_code)]

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use oxide_dal::{
    Connection, ConnectionSettings, Connector, DalError, Record, Result as DalResult, SqlItem,
};
use oxide_flow::{FlowDefinition, FlowRunner, FunctionRegistry, Services};

/// Shared, ordered log of everything the mock connections did.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// A connection that records calls and fails statements containing a marker.
pub struct MockConnection {
    database: String,
    journal: Journal,
    fail_when: Option<String>,
    fail_finish: bool,
}

impl MockConnection {
    fn record(&self, kind: &str, sql: &str, params: &Record) -> DalResult<()> {
        let entry = if params.is_empty() {
            format!("{} {kind} {sql}", self.database)
        } else {
            format!("{} {kind} {sql} {}", self.database, params.clone().into_value())
        };
        self.journal.push(entry);
        match &self.fail_when {
            Some(marker) if sql.contains(marker.as_str()) => {
                Err(DalError::InvalidSchema(format!("simulated failure on {marker}")))
            }
            _ => Ok(()),
        }
    }

    fn event(&self, what: &str) {
        self.journal.push(format!("{} {what}", self.database));
    }

    /// Records a commit/rollback/close, failing it when configured to.
    fn finish(&self, what: &str) -> DalResult<()> {
        self.event(what);
        if self.fail_finish {
            return Err(DalError::InvalidSchema(format!("simulated {what} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn begin(&mut self) -> DalResult<()> {
        self.event("begin");
        Ok(())
    }

    async fn commit(&mut self) -> DalResult<()> {
        self.finish("commit")
    }

    async fn rollback(&mut self) -> DalResult<()> {
        self.finish("rollback")
    }

    async fn execute(&mut self, sql: &str, params: &Record) -> DalResult<u64> {
        self.record("execute", sql, params)?;
        Ok(1)
    }

    async fn scalar(&mut self, sql: &str, params: &Record) -> DalResult<Value> {
        self.record("scalar", sql, params)?;
        Ok(json!(3))
    }

    async fn query(&mut self, sql: &str, params: &Record) -> DalResult<Vec<Record>> {
        self.record("query", sql, params)?;
        Ok(vec![Record::new().with("id", 1)])
    }

    async fn execute_script(&mut self, sql: &str) -> DalResult<()> {
        self.record("script", sql, &Record::new())
    }

    async fn close(self: Box<Self>) -> DalResult<()> {
        self.finish("close")
    }
}

/// Opens [`MockConnection`]s named after the settings' database.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub journal: Journal,
    pub fail_when: Option<String>,
    pub fail_finish: bool,
}

impl MockConnector {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_when: Some(marker.to_string()),
            ..Self::default()
        }
    }

    /// Connections whose commit, rollback and close all fail.
    pub fn failing_to_finish() -> Self {
        Self {
            fail_finish: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, settings: &ConnectionSettings) -> DalResult<Box<dyn Connection>> {
        let database = settings.database_name();
        self.journal.push(format!("{database} open"));
        Ok(Box::new(MockConnection {
            database,
            journal: self.journal.clone(),
            fail_when: self.fail_when.clone(),
            fail_finish: self.fail_finish,
        }))
    }
}

/// Services with `main` and `audit` MySQL connections and the given items,
/// flows and functions.
pub fn services(
    items: Vec<SqlItem>,
    flows: Vec<FlowDefinition>,
    functions: FunctionRegistry,
) -> Services {
    let mut services = Services::new();
    services
        .connections
        .register("main", ConnectionSettings::new("mysql://mock/main", "mysql"));
    services
        .connections
        .register("audit", ConnectionSettings::new("mysql://mock/audit", "mysql"));
    for item in items {
        services.mapper.add(item);
    }
    for flow in flows {
        services.add_flow(flow);
    }
    services.functions = functions;
    services
}

pub fn runner(services: Services, connector: &MockConnector) -> FlowRunner {
    FlowRunner::new(Arc::new(services), Arc::new(connector.clone()))
}

pub fn write(name: &str, sql: &str) -> SqlItem {
    SqlItem::new(name, sql).connection("main").kind(oxide_dal::ExecKind::Execute)
}

pub fn read(name: &str, sql: &str) -> SqlItem {
    SqlItem::new(name, sql).connection("main").read_only()
}
