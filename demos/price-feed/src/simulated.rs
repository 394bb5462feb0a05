//! A stand-in for the computation service.
//!
//! Accepts requests synchronously, then answers each one after a random delay by
//! sending a [`Fulfillment`] down a channel, the way a real callback handler would.

use oracle_relay_core::environment::{ArchiveSink, Transport};
use oracle_relay_core::history::ArchivedRequest;
use oracle_relay_core::types::{EncodedRequest, Fulfillment, RequestId};
use oracle_relay_runtime::RequestBuilder;
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;

/// Simulated EUR/PLN rate service.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    callbacks: mpsc::Sender<Fulfillment>,
    failure_rate: f64,
}

impl SimulatedTransport {
    /// Answer requests on `callbacks`, failing roughly `failure_rate` of them.
    #[must_use]
    pub fn new(callbacks: mpsc::Sender<Fulfillment>, failure_rate: f64) -> Self {
        Self {
            callbacks,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    fn answer(&self, request: &EncodedRequest, request_id: RequestId) -> Fulfillment {
        let mut rng = rand::thread_rng();

        let date = match RequestBuilder::decode(&request.payload) {
            Ok(payload) => payload.args.into_iter().next(),
            Err(error) => {
                tracing::warn!(%request_id, %error, "Undecodable request payload");
                None
            },
        };

        match date {
            Some(_) if rng.gen_bool(self.failure_rate) => {
                Fulfillment::failure(request_id, "Rate request failed")
            },
            Some(date) => {
                let rate: f64 = rng.gen_range(4.05..4.35);
                tracing::debug!(%request_id, %date, rate, "Service computed rate");
                Fulfillment::success(request_id, format!("{rate:.3}"))
            },
            None => Fulfillment::failure(request_id, "Missing date argument"),
        }
    }
}

impl Transport for SimulatedTransport {
    fn send(&self, request: EncodedRequest) -> RequestId {
        let request_id = RequestId::new();
        let fulfillment = self.answer(&request, request_id);
        let latency = Duration::from_millis(rand::thread_rng().gen_range(20..250));
        let callbacks = self.callbacks.clone();

        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            if callbacks.send(fulfillment).await.is_err() {
                tracing::debug!(%request_id, "Callback dropped: relay stopped listening");
            }
        });

        request_id
    }
}

/// Archive sink that logs what retention removes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingArchive;

impl ArchiveSink for LoggingArchive {
    fn archive(&self, batch: Vec<ArchivedRequest>) {
        for archived in &batch {
            tracing::info!(
                position = archived.position,
                request_id = %archived.entry.request_id,
                lookup_key = %archived.entry.lookup_key,
                "Archived request"
            );
        }
    }
}
