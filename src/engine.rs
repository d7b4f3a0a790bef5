//! Embedding engine — the local driving layer.
//!
//! Segflow's core (partitioner, chunk processor, registrar) is built for an
//! external fan-out layer invoking many stateless workers. `Engine` is the
//! in-process counterpart of that layer for embedded use and tests: it
//! compiles graphs (cached by content hash), cuts plans into chunks, drives
//! them in order, fans out parallel branches, evaluates conditional
//! linkage, and round-trips resumptions.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::{
    Config, Result, SegflowError,
    model::GraphModel,
    plan::{self, GraphPartitioner, Linkage, PartitionPlan, SegmentKind, content_hash},
    common::MemCache,
    resume::ResumptionRegistrar,
    runtime::{Chunk, ChunkProcessor, ChunkStatus, ExecutionState, PlanSlice, SegmentRunner},
    store::{ObjectStore, TokenStore},
    utils,
};

/// Maximum number of compiled plans kept in memory.
const PLAN_CACHE_SIZE: usize = 256;
/// Maximum number of chunk records kept for resume routing.
const CHUNK_REFS_SIZE: usize = 4096;

/// Outcome of a run or resume call.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// execution id
    pub execution: String,
    /// terminal classification
    pub status: ChunkStatus,
    /// final state; the engine dereferences offloaded chunk results while
    /// driving, so this is always inline
    pub final_state: ExecutionState,
    /// plan id waiting to run when the outcome is not terminal
    pub next_segment_to_run: Option<usize>,
    /// resumption token id when the outcome is `Paused`
    pub resumption_id: Option<String>,
}

/// Bookkeeping for a dispatched chunk, used to route resumptions back to
/// the right plan level.
#[derive(Clone)]
struct ChunkRef {
    plan_hash: String,
    /// `(group segment, branch index)` pairs from the top level down;
    /// empty for top-level chunks
    branch_path: Vec<(usize, usize)>,
}

/// The embedding workflow engine.
pub struct Engine {
    config: Config,
    registrar: Arc<ResumptionRegistrar>,
    processor: ChunkProcessor,
    objects: Arc<dyn ObjectStore>,
    plans: MemCache<String, Arc<PartitionPlan>>,
    chunks: MemCache<String, ChunkRef>,
}

impl Engine {
    pub fn new(
        config: Config,
        runner: Arc<dyn SegmentRunner>,
        tokens: Arc<dyn TokenStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let registrar = Arc::new(ResumptionRegistrar::new(config.clone(), tokens, objects.clone()));
        let processor = ChunkProcessor::new(config.clone(), runner, registrar.clone(), objects.clone());
        Self {
            config,
            registrar,
            processor,
            objects,
            plans: MemCache::new(PLAN_CACHE_SIZE),
            chunks: MemCache::new(CHUNK_REFS_SIZE),
        }
    }

    /// Compile a graph into a partition plan, reusing the cached plan when
    /// the graph content is unchanged.
    pub fn compile(
        &self,
        model: &GraphModel,
    ) -> Result<Arc<PartitionPlan>> {
        let hash = content_hash(model);
        if let Some(plan) = self.plans.get(&hash) {
            debug!("plan cache hit for workflow {}", model.id);
            return Ok(plan);
        }
        let (plan, _counts) = GraphPartitioner::partition(model)?;
        let plan = Arc::new(plan);
        self.plans.set(hash, plan.clone());
        Ok(plan)
    }

    /// Run a workflow to completion, failure, or its first pause.
    pub async fn run(
        &self,
        model: &GraphModel,
        owner: &str,
        initial_state: Value,
    ) -> Result<RunOutcome> {
        let plan = self.compile(model)?;
        let hash = content_hash(model);
        let execution = utils::longid();
        self.drive(&plan, &hash, Vec::new(), owner, &model.id, &execution, ExecutionState::from(initial_state), 0).await
    }

    /// Resume a paused execution with an external response — a plain string
    /// or `{feedback: string}` — and keep driving.
    pub async fn resume(
        &self,
        model: &GraphModel,
        resumption_id: &str,
        response: Value,
    ) -> Result<RunOutcome> {
        let plan = self.compile(model)?;
        let hash = content_hash(model);
        let continuation = self.registrar.resume(resumption_id, response)?;

        let chunk_ref = self
            .chunks
            .get(&continuation.chunk_id)
            .ok_or(SegflowError::Token(format!("chunk {} is not tracked by this engine", continuation.chunk_id)))?;
        if chunk_ref.plan_hash != hash {
            return Err(SegflowError::Token(format!("workflow {} changed since the pause", continuation.workflow)));
        }
        if !chunk_ref.branch_path.is_empty() {
            // nested parallel branches are the fan-out layer's to resume
            return Err(SegflowError::Token(format!(
                "chunk {} belongs to a parallel branch; resume it through the fan-out layer",
                continuation.chunk_id
            )));
        }

        let paused = continuation.resume_from_index.saturating_sub(1);
        let state = continuation.merged_state;
        let start = match plan.get(paused).map(|s| &s.next) {
            Some(Linkage::Default { next }) => *next,
            Some(Linkage::Conditional { branches }) => Self::pick_conditional(paused, branches, &state)?,
            Some(Linkage::End) | None => {
                return Ok(RunOutcome {
                    execution: continuation.parent_execution,
                    status: ChunkStatus::Completed,
                    final_state: state,
                    next_segment_to_run: None,
                    resumption_id: None,
                });
            }
        };

        self.drive(&plan, &hash, Vec::new(), &continuation.owner, &continuation.workflow, &continuation.parent_execution, state, start)
            .await
    }

    /// Drive one plan level from `start`, chunk by chunk. Parallel groups
    /// recurse into each branch concurrently and merge the branch states
    /// left to right before continuing at the aggregator.
    #[allow(clippy::too_many_arguments)]
    fn drive<'a>(
        &'a self,
        plan: &'a PartitionPlan,
        plan_hash: &'a str,
        branch_path: Vec<(usize, usize)>,
        owner: &'a str,
        workflow: &'a str,
        execution: &'a str,
        state: ExecutionState,
        start: usize,
    ) -> BoxFuture<'a, Result<RunOutcome>> {
        async move {
            let mut state = state;
            let mut cursor = start;
            let mut chunk_index = 0usize;
            let total_chunks = self.count_chunks(plan);

            loop {
                let segment = plan
                    .get(cursor)
                    .ok_or(SegflowError::Partition(format!("segment {} out of range for plan of {}", cursor, plan.len())))?;

                if let SegmentKind::ParallelGroup { branches } = &segment.kind {
                    let branch_futures = branches.iter().enumerate().map(|(i, branch)| {
                        let mut path = branch_path.clone();
                        path.push((cursor, i));
                        self.drive(branch, plan_hash, path, owner, workflow, execution, state.clone(), 0)
                    });
                    for result in futures::future::join_all(branch_futures).await {
                        let outcome = result?;
                        match outcome.status {
                            ChunkStatus::Completed => state.merge(outcome.final_state.to_value(), self.config.message_window_size),
                            // a paused or failed branch ends this drive;
                            // the aggregator never runs on partial input
                            _ => return Ok(outcome),
                        }
                    }
                    cursor = match &segment.next {
                        Linkage::Default { next } => *next,
                        _ => {
                            return Ok(self.outcome(execution, ChunkStatus::Completed, state, None, None));
                        }
                    };
                    continue;
                }

                let chunk = self.make_chunk(plan, owner, workflow, execution, cursor, chunk_index, total_chunks, state.clone());
                chunk_index += 1;
                self.chunks.set(
                    chunk.chunk_id.clone(),
                    ChunkRef {
                        plan_hash: plan_hash.to_string(),
                        branch_path: branch_path.clone(),
                    },
                );

                let result = self.processor.process(chunk).await?;
                state = match result.final_state_pointer.as_deref() {
                    Some(pointer) => self.dereference_result(pointer)?,
                    None => result.final_state,
                };

                match result.status {
                    ChunkStatus::Paused => {
                        return Ok(self.outcome(execution, ChunkStatus::Paused, state, None, result.resumption_id));
                    }
                    ChunkStatus::Failed | ChunkStatus::PartialFailure => {
                        return Ok(self.outcome(execution, result.status, state, result.next_segment_to_run, None));
                    }
                    ChunkStatus::Completed => match result.next_segment_to_run {
                        Some(next) => cursor = next,
                        None => {
                            let last = result.last_completed_segment.unwrap_or(cursor);
                            let last_segment = plan.get(last).ok_or(SegflowError::Partition(format!("segment {} out of range", last)))?;
                            match &last_segment.next {
                                Linkage::End => {
                                    return Ok(self.outcome(execution, ChunkStatus::Completed, state, None, None));
                                }
                                Linkage::Conditional { branches } => {
                                    cursor = Self::pick_conditional(last, branches, &state)?;
                                }
                                Linkage::Default { next } => cursor = *next,
                            }
                        }
                    },
                }
            }
        }
        .boxed()
    }

    /// Cut a chunk from `start`: the longest run of segments that execute
    /// strictly in order (each linking by default to the next position, no
    /// parallel group), capped by `max_segments_per_chunk`.
    #[allow(clippy::too_many_arguments)]
    fn make_chunk(
        &self,
        plan: &PartitionPlan,
        owner: &str,
        workflow: &str,
        execution: &str,
        start: usize,
        chunk_index: usize,
        total_chunks: usize,
        state: ExecutionState,
    ) -> Chunk {
        let end = self.run_end(plan, start);

        Chunk {
            chunk_id: utils::longid(),
            chunk_index,
            total_chunks,
            start_segment: start,
            slice: PlanSlice::Inline(plan.segments[start..=end].to_vec()),
            current_state: state,
            owner: owner.to_string(),
            workflow: workflow.to_string(),
            execution: execution.to_string(),
        }
    }

    /// Last index of the strict in-order run beginning at `start`: every
    /// segment but the last links by default to the next position, no
    /// parallel groups, capped by `max_segments_per_chunk`.
    fn run_end(
        &self,
        plan: &PartitionPlan,
        start: usize,
    ) -> usize {
        let mut end = start;
        while end - start + 1 < self.config.max_segments_per_chunk {
            let extend = match plan.segments[end].next {
                Linkage::Default { next } if next == end + 1 => !plan.segments[next].is_parallel_group(),
                _ => false,
            };
            if !extend {
                break;
            }
            end += 1;
        }
        end
    }

    /// Number of chunks a full sequential pass over this plan produces.
    fn count_chunks(
        &self,
        plan: &PartitionPlan,
    ) -> usize {
        let mut count = 0;
        let mut i = 0;
        while i < plan.len() {
            count += 1;
            if plan.segments[i].is_parallel_group() {
                i += 1;
            } else {
                i = self.run_end(plan, i) + 1;
            }
        }
        count
    }

    /// First matching conditional target; an unguarded target is the
    /// fallback.
    fn pick_conditional(
        segment: usize,
        branches: &[plan::ConditionalTarget],
        state: &ExecutionState,
    ) -> Result<usize> {
        for target in branches {
            match &target.condition {
                Some(condition) if plan::evaluate(condition, state) => return Ok(target.target),
                None => return Ok(target.target),
                _ => {}
            }
        }
        Err(SegflowError::ChunkExecution {
            segment,
            message: "no conditional branch matched the current state".to_string(),
        })
    }

    /// Read back a chunk result the processor offloaded to the object store.
    fn dereference_result(
        &self,
        pointer: &str,
    ) -> Result<ExecutionState> {
        let bytes = self.objects.get(pointer)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        let state = value.get("final_state").cloned().unwrap_or(Value::Null);
        Ok(serde_json::from_value(state)?)
    }

    fn outcome(
        &self,
        execution: &str,
        status: ChunkStatus,
        final_state: ExecutionState,
        next_segment_to_run: Option<usize>,
        resumption_id: Option<String>,
    ) -> RunOutcome {
        RunOutcome {
            execution: execution.to_string(),
            status,
            final_state,
            next_segment_to_run,
            resumption_id,
        }
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, sync::Arc};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::{
        Config, EngineBuilder, Result,
        model::{ComparisonOperator, Condition, ConditionValue, EdgeKind, EdgeModel, GraphModel, NodeKind, NodeModel},
        plan::SegmentKind,
        runtime::{ChunkStatus, ExecutionState, RunnerOutput, SegmentEvent, SegmentRunner},
    };

    /// Completes every segment with a `ran_<node>` marker (or a scripted
    /// override), and pauses on HITL segments with a callback credential.
    struct TestRunner {
        overrides: HashMap<String, Value>,
    }

    impl TestRunner {
        fn new() -> Self {
            Self {
                overrides: HashMap::new(),
            }
        }

        fn with_output(
            mut self,
            node: &str,
            output: Value,
        ) -> Self {
            self.overrides.insert(node.to_string(), output);
            self
        }
    }

    #[async_trait]
    impl SegmentRunner for TestRunner {
        async fn run(
            &self,
            event: SegmentEvent,
        ) -> Result<RunnerOutput> {
            if event.segment.kind == SegmentKind::Hitl {
                return Ok(RunnerOutput::pause(format!("cred-{}", event.segment_index)));
            }

            let mut state = ExecutionState::new();
            for node in event.segment.node_ids.iter() {
                match self.overrides.get(node) {
                    Some(output) => state.merge(output.clone(), 20),
                    None => state.set(format!("ran_{}", node), true),
                }
            }
            Ok(RunnerOutput::complete(state))
        }
    }

    fn node(
        id: &str,
        kind: NodeKind,
    ) -> NodeModel {
        NodeModel {
            id: id.to_string(),
            title: id.to_string(),
            kind,
            ..Default::default()
        }
    }

    fn edge(
        source: &str,
        target: &str,
    ) -> EdgeModel {
        EdgeModel {
            id: format!("{}-{}", source, target),
            source: source.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    fn model(
        nodes: Vec<NodeModel>,
        edges: Vec<EdgeModel>,
    ) -> GraphModel {
        GraphModel {
            id: "wf1".to_string(),
            name: "wf1".to_string(),
            nodes,
            edges,
            ..Default::default()
        }
    }

    fn engine(runner: TestRunner) -> crate::Engine {
        EngineBuilder::new().config(Config::default()).runner(Arc::new(runner)).build().unwrap()
    }

    #[tokio::test]
    async fn test_linear_run_completes() {
        let m = model(
            vec![node("a", NodeKind::Operator), node("b", NodeKind::Llm), node("c", NodeKind::Operator)],
            vec![edge("a", "b"), edge("b", "c")],
        );
        let engine = engine(TestRunner::new());
        let outcome = engine.run(&m, "acme", json!({ "input": "hello" })).await.unwrap();

        assert_eq!(outcome.status, ChunkStatus::Completed);
        assert!(!outcome.execution.is_empty());
        // final state composes the initial state and every segment output
        assert_eq!(outcome.final_state.get("input"), Some(json!("hello")));
        for id in ["a", "b", "c"] {
            assert_eq!(outcome.final_state.get(&format!("ran_{}", id)), Some(json!(true)));
        }
    }

    #[tokio::test]
    async fn test_pause_resume_roundtrip() {
        let mut to_gate = edge("a", "h");
        to_gate.kind = EdgeKind::Hitl;
        let m = model(
            vec![node("a", NodeKind::Operator), node("h", NodeKind::Approval), node("b", NodeKind::Operator)],
            vec![to_gate, edge("h", "b")],
        );
        let engine = engine(TestRunner::new());

        let paused = engine.run(&m, "acme", json!({})).await.unwrap();
        assert_eq!(paused.status, ChunkStatus::Paused);
        assert_eq!(paused.final_state.get("ran_a"), Some(json!(true)));
        let resumption_id = paused.resumption_id.clone().unwrap();

        let outcome = engine.resume(&m, &resumption_id, json!("Approved")).await.unwrap();
        assert_eq!(outcome.status, ChunkStatus::Completed);
        assert_eq!(outcome.execution, paused.execution);
        // the response was appended to the message window, not merged as a key
        assert_eq!(outcome.final_state.messages(), vec!["Approved"]);
        assert_eq!(outcome.final_state.get("ran_a"), Some(json!(true)));
        assert_eq!(outcome.final_state.get("ran_b"), Some(json!(true)));

        // single use: the same token cannot resume twice
        let err = engine.resume(&m, &resumption_id, json!("Approved")).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_conditional_routing_follows_state() {
        let cond = |value: &str| Condition {
            variable: "decision".to_string(),
            operator: ComparisonOperator::Is,
            value: Some(ConditionValue::Str(value.to_string())),
        };
        let mut left = edge("a", "b");
        left.kind = EdgeKind::Conditional;
        left.condition = Some(cond("left"));
        let mut right = edge("a", "c");
        right.kind = EdgeKind::Conditional;
        right.condition = Some(cond("right"));

        let m = model(vec![node("a", NodeKind::Operator), node("b", NodeKind::Operator), node("c", NodeKind::Operator)], vec![left, right]);
        let runner = TestRunner::new().with_output("a", json!({ "decision": "left" }));
        let engine = engine(runner);

        let outcome = engine.run(&m, "acme", json!({})).await.unwrap();
        assert_eq!(outcome.status, ChunkStatus::Completed);
        assert_eq!(outcome.final_state.get("ran_b"), Some(json!(true)));
        assert_eq!(outcome.final_state.get("ran_c"), None);
    }

    #[tokio::test]
    async fn test_parallel_branches_merge_before_aggregator() {
        let m = model(
            vec![
                node("s", NodeKind::Operator),
                node("b", NodeKind::Operator),
                node("c", NodeKind::Operator),
                node("m", NodeKind::Operator),
                node("t", NodeKind::Operator),
            ],
            vec![edge("s", "b"), edge("s", "c"), edge("b", "m"), edge("c", "m"), edge("m", "t")],
        );
        let engine = engine(TestRunner::new());

        let outcome = engine.run(&m, "acme", json!({})).await.unwrap();
        assert_eq!(outcome.status, ChunkStatus::Completed);
        for id in ["s", "b", "c", "m", "t"] {
            assert_eq!(outcome.final_state.get(&format!("ran_{}", id)), Some(json!(true)), "missing ran_{}", id);
        }
    }

    #[tokio::test]
    async fn test_compile_caches_by_content_hash() {
        let m = model(vec![node("a", NodeKind::Operator), node("b", NodeKind::Operator)], vec![edge("a", "b")]);
        let engine = engine(TestRunner::new());

        let first = engine.compile(&m).unwrap();
        let second = engine.compile(&m).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // edge order does not bust the cache
        let mut reordered = m.clone();
        reordered.edges.reverse();
        let third = engine.compile(&reordered).unwrap();
        assert!(Arc::ptr_eq(&first, &third));
    }
}
