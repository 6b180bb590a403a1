//! Client-side orchestration for the policy simulator.
//!
//! Five components sit between the backend services and the renderer:
//!
//! - [`SessionController`] owns the policy configuration, the interpretation
//!   conversation and the run lifecycle, and drives everything else.
//! - [`ProgressSync`] reconciles the 1s status poll (the only writer of run
//!   state) with the per-run push channel (observation only).
//! - [`ResultCompositor`] merges per-timestep results onto the static tract
//!   geometry, discarding fetches superseded by a newer timestep or run.
//! - [`PlaybackController`] walks the timeline on a timer and emits timestep
//!   changes for the compositor and the host view.
//! - [`ChoroplethLayer`] turns the merged geometry into per-feature fill and
//!   outline styles.
//!
//! Each background loop is owned through an abort-on-drop guard, so tearing
//! a component down (explicitly or by dropping it) releases its poll
//! interval, push channel, in-flight fetch or playback timer without a
//! separate cleanup call.

pub mod choropleth;
pub mod compositor;
pub mod playback;
pub mod progress;
pub mod session;
pub mod state;
mod task;

pub use choropleth::{ChoroplethLayer, FeatureStyle, FillEncoding, OutlineEncoding};
pub use compositor::ResultCompositor;
pub use playback::{PlaybackController, PlaybackSpeed};
pub use progress::{PhaseProbe, ProgressSync, PushObserver, StatusSink, POLL_INTERVAL};
pub use session::SessionController;
pub use state::{RunPhase, SessionState};
