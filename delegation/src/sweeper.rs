// delegation/src/sweeper.rs
use actix::{Actor, AsyncContext, Context, Handler, Message, MessageResult};
use std::sync::Arc;
use std::time::Duration;

use crate::service::{DelegationService, SweepReport};

/// Run a cleanup pass immediately
#[derive(Message)]
#[rtype(result = "SweepReport")]
pub struct SweepNow;

/// Periodically expires nonces, delegations and replay entries
pub struct Sweeper {
    service: Arc<DelegationService>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(service: Arc<DelegationService>) -> Self {
        let interval = service.sweep_interval();
        Self { service, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn sweep(&self) -> SweepReport {
        let report = self.service.sweep();
        if report.total() > 0 {
            tracing::info!(
                "Sweep removed {} nonces, {} delegations, {} replay entries",
                report.nonces,
                report.delegations,
                report.replay_entries
            );
        } else {
            tracing::debug!("Sweep found nothing to remove");
        }
        report
    }
}

impl Actor for Sweeper {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("Sweeper started, interval {:?}", self.interval);
        ctx.run_interval(self.interval, |act, _ctx| {
            act.sweep();
        });
    }
}

impl Handler<SweepNow> for Sweeper {
    type Result = MessageResult<SweepNow>;

    fn handle(&mut self, _msg: SweepNow, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.sweep())
    }
}
