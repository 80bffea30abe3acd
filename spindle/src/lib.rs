//! # Spindle
//!
//! A bounded research orchestration engine for LLM agents. One topic goes
//! in; a cited Markdown report comes out, produced by a cyclical state
//! machine — **plan → research → critique → refine → finish** — with
//! guaranteed termination, runtime tool discovery, risk-gated human
//! approvals, and a vector-backed memory store.
//!
//! ## Design principles
//!
//! - **Single state type per graph**: [`ResearchState`] flows through every
//!   node; nodes mutate it between transitions and nothing else holds a
//!   reference during a run.
//! - **Bounded cycles**: only the research node increments the iteration
//!   counter, and the single conditional edge checks the hard cap (5)
//!   before the quality threshold. A configured cap above 5 clamps down.
//! - **Honest refusal**: a task whose required capabilities are not covered
//!   by the discovered tools returns a [`ToolGapReport`] — a first-class
//!   outcome, never an exception, never fabricated tool output.
//! - **Fail-closed risk**: unknown tool names classify as irreversible;
//!   irreversible actions are never dispatched without an explicit human
//!   approval. Approval timeout escalates and skips — it never approves.
//! - **One telemetry surface**: every component emits spans through
//!   [`telemetry`]; audit decisions ride [`trace::TraceEvent`]s.
//!
//! ## Main modules
//!
//! - [`graph`]: [`StateGraph`], [`CompiledStateGraph`], [`Node`], [`Next`] —
//!   build and run state graphs with conditional routing and snapshots.
//! - [`research`]: the five research nodes, [`ResearchState`], routing, and
//!   [`build_research_graph`].
//! - [`agent`]: [`AgentRunner`] — one reasoning turn with tool use and
//!   risk-aware deferral.
//! - [`llm`]: [`ModelClient`] trait, [`OpenAiModel`], [`MockModel`].
//! - [`memory`]: [`MemoryStore`] trait, [`SqliteVecMemory`],
//!   [`InMemoryMemory`], [`Embedder`].
//! - [`tool_source`]: [`ToolSource`], [`ToolRegistry`], [`McpToolSource`],
//!   [`GapDetector`].
//! - [`risk`]: risk classification and the approval decision table.
//! - [`approval`]: [`ApprovalCoordinator`] — suspend, resume, escalate.
//! - [`orchestrator`]: [`Orchestrator`] — the step the workflow engine
//!   invokes.
//! - [`report`]: deterministic Markdown formatting.
//! - [`telemetry`] / [`trace`]: span builders, OTLP / in-memory export,
//!   typed audit events.
//! - [`config`]: [`EngineConfig`] — explicit validated configuration.

pub mod agent;
pub mod approval;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod report;
pub mod research;
pub mod risk;
pub mod telemetry;
pub mod tool_source;
pub mod trace;

pub use agent::{AgentOutcome, AgentResponse, AgentRunner, PlannedAction, ToolCallRecord};
pub use approval::{ApprovalCoordinator, ApprovalOutcome};
pub use config::EngineConfig;
pub use error::{AgentError, OrchestratorError, ValidationError};
pub use graph::{CompiledStateGraph, Next, Node, StateGraph};
pub use llm::{MockModel, ModelClient, OpenAiModel};
pub use memory::{Embedder, InMemoryMemory, MemoryStore, SqliteVecMemory};
pub use message::Message;
pub use orchestrator::{Orchestrator, RunOutcome, RunReport, RunRequest};
pub use research::{build_research_graph, ResearchState, ResearchStatus, SourceReference};
pub use tool_source::{
    GapDetector, McpToolSource, MemoryToolSource, StaticToolSource, ToolGapReport, ToolRegistry,
    ToolSource,
};
