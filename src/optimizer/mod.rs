//! Optimization scheduler - background instruction-improvement loop
//!
//! A fixed-interval polling loop watches the training buffer. Once enough
//! results have accumulated it builds a trainset, hands it to the external
//! optimization engine together with a metadata-reading metric and the
//! per-role feedback decomposition, persists the returned instructions as
//! the next snapshot generation, and archives the consumed batch. A failed
//! engine call is logged at the tick boundary and leaves the buffer intact
//! for the next tick; the loop never dies.

pub mod feedback;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Duration;
use tracing::{debug, error, info};

use crate::learning::LearningStore;
use crate::types::{InstructionSnapshot, TrainingResult};

pub use feedback::{default_feedback_map, FeedbackFilter, FeedbackMap};

/// One optimization training example. Score and feedback are carried
/// verbatim from the captured result so the metric never re-judges.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub input: String,
    pub score: f64,
    pub feedback: String,
}

/// What the metric reports for one example.
#[derive(Debug, Clone)]
pub struct MetricVerdict {
    pub score: f64,
    pub feedback: String,
}

/// Metric handed to the engine; reads precomputed metadata only.
pub type MetricFn = Arc<dyn Fn(&TrainingExample) -> MetricVerdict + Send + Sync>;

/// Tuning knobs forwarded to the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_metric_calls: usize,
}

/// What the engine returns: the optimized per-role instruction text and
/// the best score it measured.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub instructions: HashMap<String, Option<String>>,
    pub best_score: f64,
}

/// External optimization engine (feedback-driven prompt search).
#[async_trait]
pub trait OptimizationEngine: Send + Sync {
    /// Optimize the seed instructions against the trainset.
    async fn compile(
        &self,
        seed: HashMap<String, Option<String>>,
        trainset: Vec<TrainingExample>,
        metric: MetricFn,
        feedback_map: &FeedbackMap,
        config: &EngineConfig,
    ) -> anyhow::Result<CompiledProgram>;
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Seconds between polling ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Minimum buffered results before a pass runs.
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    /// Metric-call budget forwarded to the engine.
    #[serde(default = "default_max_metric_calls")]
    pub max_metric_calls: usize,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_min_batch_size() -> usize {
    5
}

fn default_max_metric_calls() -> usize {
    100
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            min_batch_size: default_min_batch_size(),
            max_metric_calls: default_max_metric_calls(),
        }
    }
}

/// Scheduler counters.
#[derive(Debug, Clone, Default)]
pub struct OptimizerStats {
    pub ticks: u64,
    pub passes: u64,
    pub failures: u64,
    pub last_pass: Option<DateTime<Utc>>,
}

/// Background optimization scheduler.
pub struct OptimizerScheduler {
    store: Arc<LearningStore>,
    engine: Arc<dyn OptimizationEngine>,
    config: OptimizerConfig,
    feedback_map: FeedbackMap,
    stats: Arc<RwLock<OptimizerStats>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl OptimizerScheduler {
    pub fn new(
        store: Arc<LearningStore>,
        engine: Arc<dyn OptimizationEngine>,
        config: OptimizerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store,
            engine,
            config,
            feedback_map: default_feedback_map(),
            stats: Arc::new(RwLock::new(OptimizerStats::default())),
            shutdown_tx,
        }
    }

    pub async fn stats(&self) -> OptimizerStats {
        self.stats.read().await.clone()
    }

    /// Spawn the polling loop. Stopping is observed at the sleep point.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        // Subscribe before spawning so a stop() issued immediately after
        // start() is never lost.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(scheduler.config.interval_secs));
            // First tick fires immediately; skip it so a fresh start waits
            // a full interval before touching the buffer.
            interval.tick().await;

            info!(
                "Optimization loop started (every {}s, min batch {})",
                scheduler.config.interval_secs, scheduler.config.min_batch_size
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Optimization loop received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        scheduler.tick().await;
                    }
                }
            }

            info!("Optimization loop exited");
        })
    }

    /// Signal the polling loop to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn tick(&self) {
        {
            let mut stats = self.stats.write().await;
            stats.ticks += 1;
        }

        match self.check_and_optimize().await {
            Ok(true) => {
                let mut stats = self.stats.write().await;
                stats.passes += 1;
                stats.last_pass = Some(Utc::now());
            }
            Ok(false) => {}
            Err(e) => {
                // Buffer was left un-consumed; the next tick retries.
                let mut stats = self.stats.write().await;
                stats.failures += 1;
                error!("Optimization pass failed: {:#}", e);
            }
        }
    }

    /// Run a pass if enough results are buffered. Below the threshold this
    /// is a pure no-op: neither the buffer nor the snapshot is touched.
    /// Returns whether a pass ran.
    pub async fn check_and_optimize(&self) -> anyhow::Result<bool> {
        let buffer = self.store.peek_buffer().await;
        if buffer.len() < self.config.min_batch_size {
            debug!(
                "{} buffered results (minimum {}); skipping optimization",
                buffer.len(),
                self.config.min_batch_size
            );
            return Ok(false);
        }
        self.optimize(buffer).await?;
        Ok(true)
    }

    /// One optimization pass over `batch`.
    ///
    /// Persists whatever the engine returns as the next generation and
    /// then consumes the optimized batch, both unconditionally. Callers
    /// wanting an only-apply-if-improved gate layer it on top.
    pub async fn optimize(&self, batch: Vec<TrainingResult>) -> anyhow::Result<InstructionSnapshot> {
        info!("Starting optimization pass over {} results", batch.len());

        let trainset: Vec<TrainingExample> = batch
            .iter()
            .map(|r| TrainingExample {
                input: r.task.clone(),
                score: r.score,
                feedback: r.feedback.clone(),
            })
            .collect();

        let previous = self.store.load_instructions();
        let seed = previous
            .as_ref()
            .map(|s| s.instructions.clone())
            .unwrap_or_default();

        let metric: MetricFn = Arc::new(|example| MetricVerdict {
            score: example.score,
            feedback: example.feedback.clone(),
        });
        let engine_config = EngineConfig {
            max_metric_calls: self.config.max_metric_calls,
        };

        let compiled = self
            .engine
            .compile(seed, trainset, metric, &self.feedback_map, &engine_config)
            .await?;

        let generation = previous.map(|s| s.generation).unwrap_or(0) + 1;
        let snapshot =
            self.store
                .save_instructions(compiled.instructions, compiled.best_score, generation)?;
        self.store.consume_buffer().await?;

        info!(
            "Optimization pass complete: generation {} (best score {:.2})",
            generation, compiled.best_score
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine double: counts calls, optionally fails the first N, and
    /// records the trainset size it saw.
    struct ScriptedEngine {
        calls: AtomicUsize,
        failures_remaining: AtomicUsize,
        last_trainset_len: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new() -> Arc<Self> {
            Self::failing(0)
        }

        fn failing(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures_remaining: AtomicUsize::new(failures),
                last_trainset_len: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OptimizationEngine for ScriptedEngine {
        async fn compile(
            &self,
            _seed: HashMap<String, Option<String>>,
            trainset: Vec<TrainingExample>,
            metric: MetricFn,
            feedback_map: &FeedbackMap,
            _config: &EngineConfig,
        ) -> anyhow::Result<CompiledProgram> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("engine exploded");
            }
            self.last_trainset_len
                .store(trainset.len(), Ordering::SeqCst);

            // Engines read the precomputed metadata through the metric.
            let best_score = trainset
                .iter()
                .map(|ex| metric(ex).score)
                .fold(0.0_f64, f64::max);
            let mut instructions: HashMap<String, Option<String>> = HashMap::new();
            for role in feedback_map.keys() {
                instructions.insert(role.clone(), Some(format!("optimized {}", role)));
            }
            Ok(CompiledProgram {
                instructions,
                best_score,
            })
        }
    }

    fn fixture(
        min_batch_size: usize,
        engine: Arc<ScriptedEngine>,
    ) -> (tempfile::TempDir, Arc<LearningStore>, OptimizerScheduler) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LearningStore::with_dir(dir.path()).unwrap());
        let config = OptimizerConfig {
            min_batch_size,
            ..Default::default()
        };
        let scheduler = OptimizerScheduler::new(store.clone(), engine, config);
        (dir, store, scheduler)
    }

    async fn seed_results(store: &LearningStore, count: usize) {
        for i in 0..count {
            store
                .append_result(&TrainingResult::new(
                    format!("task {}", i),
                    format!("solution {}", i),
                    i as f64,
                    "good approach to the plan",
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn below_threshold_is_a_byte_identical_noop() {
        let engine = ScriptedEngine::new();
        let (_dir, store, scheduler) = fixture(5, engine.clone());
        seed_results(&store, 3).await;
        store.save_instructions(HashMap::new(), 1.0, 1).unwrap();

        let buffer_before = std::fs::read(store.base_dir().join("training_buffer")).unwrap();
        let snapshot_before = std::fs::read(store.base_dir().join("instructions")).unwrap();

        let ran = scheduler.check_and_optimize().await.unwrap();
        assert!(!ran);
        assert_eq!(engine.calls(), 0);
        assert_eq!(
            std::fs::read(store.base_dir().join("training_buffer")).unwrap(),
            buffer_before
        );
        assert_eq!(
            std::fs::read(store.base_dir().join("instructions")).unwrap(),
            snapshot_before
        );
    }

    #[tokio::test]
    async fn first_pass_produces_generation_one_and_archives() {
        let engine = ScriptedEngine::new();
        let (_dir, store, scheduler) = fixture(5, engine.clone());
        seed_results(&store, 6).await;

        let ran = scheduler.check_and_optimize().await.unwrap();
        assert!(ran);
        assert_eq!(engine.calls(), 1);
        assert_eq!(engine.last_trainset_len.load(Ordering::SeqCst), 6);

        let snapshot = store.load_instructions().unwrap();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.score, 5.0);
        assert_eq!(
            snapshot.instruction_for("reasoning"),
            Some("optimized reasoning")
        );
        assert_eq!(
            snapshot.instruction_for("observation"),
            Some("optimized observation")
        );

        assert!(store.peek_buffer().await.is_empty());
        assert_eq!(store.archive_entries().len(), 1);
    }

    #[tokio::test]
    async fn generation_increments_from_previous_snapshot() {
        let engine = ScriptedEngine::new();
        let (_dir, store, scheduler) = fixture(2, engine);
        store.save_instructions(HashMap::new(), 4.0, 3).unwrap();
        seed_results(&store, 2).await;

        scheduler.check_and_optimize().await.unwrap();
        assert_eq!(store.load_instructions().unwrap().generation, 4);
    }

    #[tokio::test]
    async fn engine_failure_leaves_buffer_for_retry() {
        let engine = ScriptedEngine::failing(1);
        let (_dir, store, scheduler) = fixture(5, engine.clone());
        seed_results(&store, 5).await;

        let err = scheduler.check_and_optimize().await;
        assert!(err.is_err());
        assert_eq!(store.peek_buffer().await.len(), 5);
        assert!(store.load_instructions().is_none());
        assert!(store.archive_entries().is_empty());

        // The next tick retries and succeeds.
        let ran = scheduler.check_and_optimize().await.unwrap();
        assert!(ran);
        assert_eq!(engine.calls(), 2);
        assert!(store.peek_buffer().await.is_empty());
        assert_eq!(store.load_instructions().unwrap().generation, 1);
    }

    #[tokio::test]
    async fn tick_isolates_engine_failures() {
        let engine = ScriptedEngine::failing(1);
        let (_dir, store, scheduler) = fixture(2, engine);
        seed_results(&store, 2).await;

        scheduler.tick().await;
        let stats = scheduler.stats().await;
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.passes, 0);

        scheduler.tick().await;
        let stats = scheduler.stats().await;
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.passes, 1);
        assert!(stats.last_pass.is_some());
        assert!(store.peek_buffer().await.is_empty());
    }

    #[tokio::test]
    async fn loop_stops_at_shutdown_signal() {
        let engine = ScriptedEngine::new();
        let (_dir, _store, scheduler) = fixture(5, engine);
        let scheduler = Arc::new(scheduler);

        let handle = scheduler.start();
        scheduler.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should exit promptly")
            .unwrap();
    }
}
