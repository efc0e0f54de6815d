//! Sample types for the monitored streams of a PRD execution.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::history::HistoryBuffer;

/// Monitored signal streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    CodeGeneration,
    ContextBuild,
    TaskDependency,
    TestGeneration,
    Validation,
    ProviderResponse,
    PhaseProgress,
    PatternLearning,
    SchemaValidation,
}

impl StreamKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CodeGeneration => "code_generation",
            Self::ContextBuild => "context_build",
            Self::TaskDependency => "task_dependency",
            Self::TestGeneration => "test_generation",
            Self::Validation => "validation",
            Self::ProviderResponse => "provider_response",
            Self::PhaseProgress => "phase_progress",
            Self::PatternLearning => "pattern_learning",
            Self::SchemaValidation => "schema_validation",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one code-generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGenSample {
    pub success: bool,
    pub test_passed: bool,
}

/// Statistics of one context-window build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBuildSample {
    pub files_requested: u32,
    pub files_missing: u32,
    pub tokens_used: u64,
    pub success: bool,
}

/// A change in task-dependency state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DependencyEvent {
    Declared { depends_on: String },
    Removed { depends_on: String },
    Blocked { reason: String },
    Unblocked { waited_ms: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySample {
    pub task_id: String,
    pub event: DependencyEvent,
}

/// Outcome of one test-generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestGenSample {
    pub tests_generated: u32,
    pub success: bool,
    /// Generated tests failed on their very first run.
    pub immediate_failure: bool,
}

/// Outcome of one validation gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationSample {
    pub blocked: bool,
    pub false_positive: bool,
    pub duration_ms: f64,
}

/// One AI provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSample {
    pub provider: String,
    pub model: String,
    pub success: bool,
    pub error: bool,
    pub timeout: bool,
    pub latency_ms: f64,
    /// Response quality score in `[0, 1]`.
    pub quality: f64,
}

/// Progress reading for a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgressSample {
    pub phase_id: String,
    pub completed_tasks: u32,
    pub total_tasks: u32,
}

/// Outcome of one pattern-learning lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSample {
    pub pattern_id: String,
    pub matched: bool,
    pub applied: bool,
    /// The same failure pattern was seen again after being learned.
    pub recurring: bool,
}

/// Outcome of one schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchemaValidationSample {
    pub valid: bool,
    pub false_positive: bool,
    pub validation_time_ms: f64,
}

/// One history buffer per monitored stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredStreams {
    pub code_generation: HistoryBuffer<CodeGenSample>,
    pub context_build: HistoryBuffer<ContextBuildSample>,
    pub task_dependency: HistoryBuffer<DependencySample>,
    pub test_generation: HistoryBuffer<TestGenSample>,
    pub validation: HistoryBuffer<ValidationSample>,
    pub provider_response: HistoryBuffer<ProviderSample>,
    pub phase_progress: HistoryBuffer<PhaseProgressSample>,
    pub pattern_learning: HistoryBuffer<PatternSample>,
    pub schema_validation: HistoryBuffer<SchemaValidationSample>,
}

impl MonitoredStreams {
    pub fn new(capacity: usize) -> Self {
        Self {
            code_generation: HistoryBuffer::new(capacity),
            context_build: HistoryBuffer::new(capacity),
            task_dependency: HistoryBuffer::new(capacity),
            test_generation: HistoryBuffer::new(capacity),
            validation: HistoryBuffer::new(capacity),
            provider_response: HistoryBuffer::new(capacity),
            phase_progress: HistoryBuffer::new(capacity),
            pattern_learning: HistoryBuffer::new(capacity),
            schema_validation: HistoryBuffer::new(capacity),
        }
    }

    pub fn len(&self, stream: StreamKind) -> usize {
        match stream {
            StreamKind::CodeGeneration => self.code_generation.len(),
            StreamKind::ContextBuild => self.context_build.len(),
            StreamKind::TaskDependency => self.task_dependency.len(),
            StreamKind::TestGeneration => self.test_generation.len(),
            StreamKind::Validation => self.validation.len(),
            StreamKind::ProviderResponse => self.provider_response.len(),
            StreamKind::PhaseProgress => self.phase_progress.len(),
            StreamKind::PatternLearning => self.pattern_learning.len(),
            StreamKind::SchemaValidation => self.schema_validation.len(),
        }
    }

    pub fn reset_stream(&mut self, stream: StreamKind) {
        match stream {
            StreamKind::CodeGeneration => self.code_generation.clear(),
            StreamKind::ContextBuild => self.context_build.clear(),
            StreamKind::TaskDependency => self.task_dependency.clear(),
            StreamKind::TestGeneration => self.test_generation.clear(),
            StreamKind::Validation => self.validation.clear(),
            StreamKind::ProviderResponse => self.provider_response.clear(),
            StreamKind::PhaseProgress => self.phase_progress.clear(),
            StreamKind::PatternLearning => self.pattern_learning.clear(),
            StreamKind::SchemaValidation => self.schema_validation.clear(),
        }
    }

    pub fn clear(&mut self) {
        for stream in ALL_STREAMS {
            self.reset_stream(stream);
        }
    }
}

const ALL_STREAMS: [StreamKind; 9] = [
    StreamKind::CodeGeneration,
    StreamKind::ContextBuild,
    StreamKind::TaskDependency,
    StreamKind::TestGeneration,
    StreamKind::Validation,
    StreamKind::ProviderResponse,
    StreamKind::PhaseProgress,
    StreamKind::PatternLearning,
    StreamKind::SchemaValidation,
];
