//! A minimal sequential runner on top of [`TestDb::run`].
//!
//! Cases run in declaration order on one connection. A failing or panicking
//! case is recorded and the next case still starts from the same database
//! state as the first.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use db_infra::{ConnectionError, DbConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use sea_orm::DatabaseTransaction;
use tracing::{error, info, warn};

use crate::test_db::TestDb;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type CaseBody = Box<
    dyn for<'t> FnOnce(&'t DatabaseTransaction) -> BoxFuture<'t, Result<(), BoxError>> + Send,
>;

struct Case {
    name: String,
    body: CaseBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| c.outcome == Outcome::Passed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|c| c.name == name)
    }
}

#[derive(Default)]
pub struct Suite {
    cases: Vec<Case>,
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: for<'t> FnOnce(&'t DatabaseTransaction) -> BoxFuture<'t, Result<(), BoxError>>
            + Send
            + 'static,
    {
        self.cases.push(Case {
            name: name.into(),
            body: Box::new(body),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Connect, then run every case. A connection failure aborts the whole
    /// suite before any case executes.
    pub async fn run(self, config: &DbConfig) -> Result<SuiteReport, ConnectionError> {
        let db = match TestDb::connect(config).await {
            Ok(db) => db,
            Err(e) => {
                error!(
                    "suite=aborted reason=connection cases={} error={}",
                    self.len(),
                    e
                );
                return Err(e);
            }
        };
        Ok(self.run_on(&db).await)
    }

    pub async fn run_on(self, db: &TestDb) -> SuiteReport {
        let mut report = SuiteReport::default();

        for Case { name, body } in self.cases {
            let started = Instant::now();
            let outcome = match AssertUnwindSafe(db.run(body)).catch_unwind().await {
                Ok(Ok(())) => Outcome::Passed,
                Ok(Err(err)) => Outcome::Failed(err.to_string()),
                Err(payload) => Outcome::Failed(panic_message(payload.as_ref())),
            };
            let elapsed = started.elapsed();

            match &outcome {
                Outcome::Passed => info!(
                    "case=passed name={} elapsed_ms={}",
                    name,
                    elapsed.as_millis()
                ),
                Outcome::Failed(reason) => warn!(
                    "case=failed name={} elapsed_ms={} reason={}",
                    name,
                    elapsed.as_millis(),
                    reason
                ),
            }

            report.cases.push(CaseReport {
                name,
                outcome,
                elapsed,
            });
        }

        info!(
            "suite=done passed={} failed={}",
            report.passed(),
            report.failed()
        );
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "test panicked with a non-string payload".to_string()
    }
}
