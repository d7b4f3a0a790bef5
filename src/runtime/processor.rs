//! Chunk processing: the strict in-order segment loop.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::{
    Config, Result,
    plan::{Linkage, Segment},
    resume::{RegisterRequest, ResumptionRegistrar},
    runtime::{
        chunk::{Chunk, ChunkResult, ChunkStatus, PlanSlice, SegmentRecord},
        runner::{RunnerStatus, SegmentEvent, SegmentRunner},
        state::ExecutionState,
    },
    store::{ObjectStore, object_path},
    utils,
};

/// Explicit step result, pattern-matched by the processing loop. Pause and
/// termination are ordinary values, not early returns.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Advance the cursor to the next slice position.
    Continue {
        next: usize,
    },
    /// Register a resumption token carrying this credential and report the
    /// chunk as paused.
    Pause {
        credential: String,
    },
    /// Stop iterating the slice. `next_segment` names the segment the
    /// driving layer should take over at, when one is known (parallel
    /// group handoff).
    Terminal {
        next_segment: Option<usize>,
    },
}

/// Executes one chunk at a time against an injected segment runner.
///
/// One worker per chunk, no intra-process concurrency. A whole-chunk retry
/// re-executes every segment in the slice; deduplication is not performed
/// here — idempotency is the runner's contract.
pub struct ChunkProcessor {
    config: Config,
    runner: Arc<dyn SegmentRunner>,
    registrar: Arc<ResumptionRegistrar>,
    objects: Arc<dyn ObjectStore>,
}

impl ChunkProcessor {
    pub fn new(
        config: Config,
        runner: Arc<dyn SegmentRunner>,
        registrar: Arc<ResumptionRegistrar>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            runner,
            registrar,
            objects,
        }
    }

    /// Process a chunk to completion, failure, or pause.
    pub async fn process(
        &self,
        chunk: Chunk,
    ) -> Result<ChunkResult> {
        let slice = self.resolve_slice(&chunk)?;
        let mut state = chunk.current_state.clone();
        let mut records: Vec<SegmentRecord> = Vec::new();

        let mut completed = 0usize;
        let mut failures = 0usize;
        let mut last_completed = None;
        let mut paused_segment = None;
        let mut resumption_id = None;
        let mut next_segment = None;

        let mut cursor = 0usize;
        while cursor < slice.len() {
            let segment = &slice[cursor];
            let outcome = self.step(&chunk, segment, cursor, &mut state, &mut records, &mut completed, &mut failures, &mut last_completed).await;

            match outcome {
                StepOutcome::Continue { next } => cursor = next,
                StepOutcome::Pause { credential } => {
                    let id = self.registrar.register(RegisterRequest {
                        owner: chunk.owner.clone(),
                        workflow: chunk.workflow.clone(),
                        parent_execution: chunk.execution.clone(),
                        chunk_id: chunk.chunk_id.clone(),
                        paused_index: segment.id,
                        task_token: credential,
                        state: state.clone(),
                    })?;
                    debug!("chunk {} paused at segment {}", chunk.chunk_id, segment.id);
                    paused_segment = Some(segment.id);
                    resumption_id = Some(id);
                    break;
                }
                StepOutcome::Terminal { next_segment: handoff } => {
                    if handoff.is_some() {
                        next_segment = handoff;
                    }
                    break;
                }
            }
        }

        let status = if paused_segment.is_some() {
            ChunkStatus::Paused
        } else if failures == 0 {
            ChunkStatus::Completed
        } else if completed == 0 {
            ChunkStatus::Failed
        } else {
            ChunkStatus::PartialFailure
        };

        // a fully processed slice hands over at its linkage target when the
        // link is unambiguous; conditional links are the driving layer's call
        if status == ChunkStatus::Completed && next_segment.is_none() && cursor >= slice.len() {
            if let Some(Linkage::Default { next }) = slice.last().map(|s| &s.next) {
                next_segment = Some(*next);
            }
        }

        let mut result = ChunkResult {
            chunk_id: chunk.chunk_id.clone(),
            status,
            processed_segments: completed,
            last_completed_segment: last_completed,
            paused_segment_id: paused_segment,
            resumption_id,
            next_segment_to_run: next_segment,
            final_state: state,
            final_state_pointer: None,
            records,
        };
        self.offload_if_oversized(&chunk, &mut result)?;
        Ok(result)
    }

    /// Execute one segment and classify the outcome. Runner errors are
    /// caught and recorded, never propagated out of the loop.
    async fn step(
        &self,
        chunk: &Chunk,
        segment: &Segment,
        cursor: usize,
        state: &mut ExecutionState,
        records: &mut Vec<SegmentRecord>,
        completed: &mut usize,
        failures: &mut usize,
        last_completed: &mut Option<usize>,
    ) -> StepOutcome {
        if segment.is_parallel_group() {
            // nested plans are driven by the fan-out layer, not this loop
            return StepOutcome::Terminal {
                next_segment: Some(segment.id),
            };
        }

        let started_at = utils::time::time_millis();
        let event = SegmentEvent {
            owner: chunk.owner.clone(),
            workflow: chunk.workflow.clone(),
            execution: chunk.execution.clone(),
            chunk_id: chunk.chunk_id.clone(),
            segment_index: segment.id,
            segment: segment.clone(),
            state: state.clone(),
        };

        let output = match self.runner.run(event).await {
            Ok(output) => output,
            Err(e) => {
                warn!("segment {} runner error: {}", segment.id, e);
                *failures += 1;
                records.push(SegmentRecord {
                    segment_index: segment.id,
                    status: RunnerStatus::Failed,
                    error: Some(e.to_string()),
                    started_at,
                    ended_at: utils::time::time_millis(),
                });
                return self.after_failure(cursor);
            }
        };
        let ended_at = utils::time::time_millis();

        match output.status {
            RunnerStatus::Complete => {
                state.merge(output.final_state.to_value(), self.config.message_window_size);
                *completed += 1;
                *last_completed = Some(segment.id);
                records.push(SegmentRecord {
                    segment_index: segment.id,
                    status: RunnerStatus::Complete,
                    error: None,
                    started_at,
                    ended_at,
                });
                StepOutcome::Continue {
                    next: cursor + 1,
                }
            }
            RunnerStatus::Pause => match output.task_token {
                Some(credential) => {
                    records.push(SegmentRecord {
                        segment_index: segment.id,
                        status: RunnerStatus::Pause,
                        error: None,
                        started_at,
                        ended_at,
                    });
                    StepOutcome::Pause {
                        credential,
                    }
                }
                None => {
                    *failures += 1;
                    records.push(SegmentRecord {
                        segment_index: segment.id,
                        status: RunnerStatus::Failed,
                        error: Some("pause reported without a callback credential".to_string()),
                        started_at,
                        ended_at,
                    });
                    self.after_failure(cursor)
                }
            },
            RunnerStatus::ParallelGroup => StepOutcome::Terminal {
                next_segment: Some(segment.id),
            },
            RunnerStatus::Failed => {
                *failures += 1;
                records.push(SegmentRecord {
                    segment_index: segment.id,
                    status: RunnerStatus::Failed,
                    error: output.error,
                    started_at,
                    ended_at,
                });
                self.after_failure(cursor)
            }
        }
    }

    /// With fail-fast (the default) a failure halts the remaining slice;
    /// otherwise the failed segment is skipped.
    fn after_failure(
        &self,
        cursor: usize,
    ) -> StepOutcome {
        if self.config.fail_fast {
            StepOutcome::Terminal {
                next_segment: None,
            }
        } else {
            StepOutcome::Continue {
                next: cursor + 1,
            }
        }
    }

    /// Resolve the plan slice, dereferencing the object store pointer when
    /// the slice was too large to inline.
    fn resolve_slice(
        &self,
        chunk: &Chunk,
    ) -> Result<Vec<Segment>> {
        match &chunk.slice {
            PlanSlice::Inline(segments) => Ok(segments.clone()),
            PlanSlice::Pointer(pointer) => {
                let bytes = self.objects.get(pointer)?;
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }

    /// Serialize the accumulated state and result log; move both behind an
    /// object store pointer once they exceed the inline limit, so the
    /// returned payload stays bounded regardless of state size.
    ///
    /// A store failure here is fatal: state is never silently dropped.
    fn offload_if_oversized(
        &self,
        chunk: &Chunk,
        result: &mut ChunkResult,
    ) -> Result<()> {
        let payload = serde_json::to_vec(&json!({
            "final_state": result.final_state,
            "records": result.records,
        }))?;
        if payload.len() <= self.config.inline_payload_limit {
            return Ok(());
        }

        let path = object_path("results", &chunk.owner, &chunk.workflow, &chunk.execution, &chunk.chunk_id, "result.json");
        let pointer = self.objects.put(&path, payload)?;
        debug!("chunk {} result offloaded to {}", chunk.chunk_id, pointer);
        result.final_state = ExecutionState::new();
        result.records = Vec::new();
        result.final_state_pointer = Some(pointer);
        Ok(())
    }
}
