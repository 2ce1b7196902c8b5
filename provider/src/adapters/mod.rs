/// External-command adapter.
pub mod command;
/// Rig completion-model adapter.
pub mod rig;
