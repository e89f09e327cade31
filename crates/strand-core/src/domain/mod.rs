//! Domain model: tasks, states, their kinds and the values exchanged with
//! collaborators. No I/O lives here except writing loader record files.

pub mod command;
pub mod context;
pub mod ids;
pub mod kind;
pub mod metrics;
pub mod outcome;
pub mod records;
pub mod retention;
pub mod state;
pub mod status;
pub mod task;

pub use self::command::{CommandBuilder, CommandError, CommandLine, FlagLookupError, parse_flag_value};
pub use self::context::{ArraysWell, LaneContents, SampleContext, SequencingRun};
pub use self::ids::{Id, IdMarker, StateId, TaskId};
pub use self::kind::{ResourceRequest, TaskClass, TaskKind, TaskKindTag};
pub use self::outcome::{FireOutcome, PollOutcome, Probe, ProcessStatus, TaskResult};
pub use self::retention::RetentionWindow;
pub use self::state::{Phase, PhaseKind, Readiness, State};
pub use self::status::TaskStatus;
pub use self::task::{ProcessRun, StatusChange, Task};
