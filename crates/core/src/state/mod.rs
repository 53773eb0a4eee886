pub mod lab_state;
pub mod patch;

pub use lab_state::{
    Architecture, BiasReport, Component, Critique, Field, LabState, Requirements, Research,
    RunStatus, StageOutcome, StageRecord,
};
pub use patch::{apply, begin_retry, fail, succeed, PatchError, StatePatch};
