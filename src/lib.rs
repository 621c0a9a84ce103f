//! # stormtrack
//!
//! Detect/stitch core of a storm-tracking pipeline: per model time step, a **detect** stage
//! scans a gridded meteorological field for candidate storm centres (local pressure minima,
//! vorticity maxima, …), and a **stitch** stage links the time-ordered candidates into storm
//! trajectories. Both stages are configured per track type by a [`policy::TrackTypePolicy`].
//!
//! Data flow: [`grid::FieldGrid`] (one per step) → [`detect::CandidateDetector`] →
//! [`candidates::CandidateStore`] → [`stitch`] → [`stitch::Trajectory`] set, driven by a
//! [`pipeline::Pipeline`].

pub mod candidates;
pub mod constants;
pub mod detect;
pub mod grid;
pub mod pipeline;
pub mod policy;
pub mod stitch;
pub mod stormtrack_errors;
pub mod time;
