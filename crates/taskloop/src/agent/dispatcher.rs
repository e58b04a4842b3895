//! Concurrent dispatch of one step's tool calls

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

use crate::tools::{is_control_tool, GatewayOutput, ToolGateway, STATUS_EXIT, STATUS_OK, STATUS_STOP, STATUS_TIMEOUT};

use super::contract::Action;

/// Result of one tool call as the model sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub tool_name: String,
    pub text: String,
    pub is_error: bool,
    pub exit_status: i32,
}

impl Observation {
    fn from_output(name: &str, output: GatewayOutput) -> Self {
        let is_error = if is_control_tool(name) {
            !matches!(output.exit_status, STATUS_OK | STATUS_STOP | STATUS_EXIT)
        } else {
            output.is_error()
        };

        let mut text = output.combined();
        if text.trim().is_empty() {
            text = "(no output)".to_string();
        }

        Self {
            tool_name: name.to_string(),
            text,
            is_error,
            exit_status: output.exit_status,
        }
    }

    fn panicked(name: &str) -> Self {
        Self {
            tool_name: name.to_string(),
            text: "Error: tool execution failed unexpectedly.".to_string(),
            is_error: true,
            exit_status: 1,
        }
    }

    /// Whether this came from `finish`, `stop` or `exit`
    pub fn is_control(&self) -> bool {
        is_control_tool(&self.tool_name)
    }
}

/// All observations of one step, in completion order
#[derive(Debug, Clone, Default)]
pub struct StepBatch {
    pub observations: Vec<Observation>,
}

impl StepBatch {
    /// The first control observation, if any
    pub fn control_signal(&self) -> Option<&Observation> {
        self.observations.iter().find(|o| o.is_control())
    }

    pub fn error_count(&self) -> usize {
        self.observations.iter().filter(|o| o.is_error).count()
    }

    /// Content of the single user turn that carries this step's results
    pub fn merged_turn(&self) -> String {
        let mut out = format!("Observations ({} tool calls):", self.observations.len());
        for obs in &self.observations {
            out.push_str(&format!(
                "\n### {} [{}]\n{}",
                obs.tool_name,
                if obs.is_error { "error" } else { "ok" },
                obs.text
            ));
        }
        out
    }
}

/// Runs a step's tool calls with bounded parallelism
#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<dyn ToolGateway>,
    workers: usize,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn ToolGateway>, workers: usize, timeout: Duration) -> Self {
        Self {
            gateway,
            workers: workers.max(1),
            timeout,
        }
    }

    /// Execute every call, at most `min(N, workers)` at a time, and wait for all of them.
    ///
    /// Control signals do not cancel siblings already dispatched.
    #[instrument(skip(self, calls), fields(calls = calls.len()))]
    pub async fn dispatch(&self, calls: &[Action]) -> StepBatch {
        if calls.is_empty() {
            return StepBatch::default();
        }

        let permits = calls.len().min(self.workers);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut join_set = JoinSet::new();

        for (idx, call) in calls.iter().cloned().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                debug!(tool = %call.name, args = call.arguments.len(), "Dispatching tool call");
                let output = gateway.invoke(&call.name, &call.arguments, timeout).await;
                (idx, Observation::from_output(&call.name, output))
            });
        }

        let mut observations = Vec::with_capacity(calls.len());
        let mut finished = vec![false; calls.len()];

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, obs)) => {
                    if obs.is_error {
                        let category = if obs.exit_status == STATUS_TIMEOUT { "tool_timeout" } else { "tool" };
                        warn!(category, tool = %obs.tool_name, status = obs.exit_status, "Tool call failed");
                    }
                    finished[idx] = true;
                    observations.push(obs);
                }
                Err(e) => {
                    error!(error = %e, panic = e.is_panic(), "Tool task did not complete");
                }
            }
        }

        // Tasks that panicked never reported back
        for (idx, done) in finished.iter().enumerate() {
            if !done {
                observations.push(Observation::panicked(&calls[idx].name));
            }
        }

        StepBatch { observations }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Gateway whose behavior is keyed by tool name
    struct FakeGateway {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeGateway {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ToolGateway for FakeGateway {
        async fn invoke(&self, name: &str, args: &[String], _timeout: Duration) -> GatewayOutput {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = args.first().and_then(|a| a.parse().ok()).unwrap_or(5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            match name {
                "ok" => GatewayOutput::ok("fine"),
                "bad" => GatewayOutput::failure("broken"),
                "stop" => GatewayOutput {
                    text: "STOP_SIGNAL".into(),
                    error_text: String::new(),
                    exit_status: STATUS_STOP,
                },
                "finish" => GatewayOutput::ok("FINISH_SIGNAL: done"),
                "panic" => panic!("tool blew up"),
                _ => GatewayOutput::failure("unknown"),
            }
        }

        fn describe_tools(&self) -> String {
            String::new()
        }
    }

    fn dispatcher(gateway: Arc<FakeGateway>, workers: usize) -> Dispatcher {
        Dispatcher::new(gateway, workers, Duration::from_secs(5))
    }

    fn call(name: &str, delay_ms: u64) -> Action {
        Action::new(name, vec![delay_ms.to_string()])
    }

    #[tokio::test]
    async fn test_empty_batch_dispatches_nothing() {
        let gateway = Arc::new(FakeGateway::new());
        let batch = dispatcher(gateway.clone(), 4).dispatch(&[]).await;

        assert!(batch.observations.is_empty());
        assert!(batch.control_signal().is_none());
        assert_eq!(gateway.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mixed_results_multiset() {
        let gateway = Arc::new(FakeGateway::new());
        let calls = vec![
            call("ok", 30),
            call("bad", 5),
            call("ok", 1),
            call("bad", 20),
            call("ok", 10),
        ];

        let batch = dispatcher(gateway, 10).dispatch(&calls).await;
        assert_eq!(batch.observations.len(), 5);

        let mut counts: HashMap<(&str, bool), usize> = HashMap::new();
        for obs in &batch.observations {
            *counts.entry((obs.tool_name.as_str(), obs.is_error)).or_default() += 1;
        }
        assert_eq!(counts.get(&("ok", false)), Some(&3));
        assert_eq!(counts.get(&("bad", true)), Some(&2));
        assert_eq!(batch.error_count(), 2);
    }

    #[tokio::test]
    async fn test_completion_order() {
        let gateway = Arc::new(FakeGateway::new());
        let calls = vec![call("bad", 80), call("ok", 1)];

        let batch = dispatcher(gateway, 10).dispatch(&calls).await;
        assert_eq!(batch.observations[0].tool_name, "ok");
        assert_eq!(batch.observations[1].tool_name, "bad");
    }

    #[tokio::test]
    async fn test_worker_cap_bounds_concurrency() {
        let gateway = Arc::new(FakeGateway::new());
        let calls: Vec<_> = (0..8).map(|_| call("ok", 20)).collect();

        let batch = dispatcher(gateway.clone(), 3).dispatch(&calls).await;
        assert_eq!(batch.observations.len(), 8);
        assert!(gateway.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_control_signal_lets_siblings_finish() {
        let gateway = Arc::new(FakeGateway::new());
        let calls = vec![call("stop", 1), call("ok", 40), call("bad", 20)];

        let batch = dispatcher(gateway, 10).dispatch(&calls).await;
        assert_eq!(batch.observations.len(), 3);

        let stop = batch.control_signal().unwrap();
        assert_eq!(stop.tool_name, "stop");
        assert!(!stop.is_error);
        assert_eq!(stop.exit_status, STATUS_STOP);
    }

    #[tokio::test]
    async fn test_panic_becomes_error_observation() {
        let gateway = Arc::new(FakeGateway::new());
        let calls = vec![call("panic", 1), call("ok", 1)];

        let batch = dispatcher(gateway, 10).dispatch(&calls).await;
        assert_eq!(batch.observations.len(), 2);
        let failed = batch.observations.iter().find(|o| o.tool_name == "panic").unwrap();
        assert!(failed.is_error);
    }

    #[test]
    fn test_merged_turn_format() {
        let batch = StepBatch {
            observations: vec![
                Observation::from_output("read", GatewayOutput::ok("contents")),
                Observation::from_output("write", GatewayOutput::failure("Access Denied")),
            ],
        };

        assert_eq!(
            batch.merged_turn(),
            "Observations (2 tool calls):\n### read [ok]\ncontents\n### write [error]\nAccess Denied"
        );
    }
}
