//! g4post-algorithms: transforms over ragged detector hit data.
//!
//! This crate provides the engines behind the pipeline modules:
//! - **Windowing** - anchor-based time windows and regrouping
//! - **Grouping** - selection or bucketing by sensitive-volume id
//! - **Coincidence** - open-interval gating between two time series
//! - **Geometry** - cylinder and polycone acceptance, masking with group collapse
//! - **R90** - energy-weighted containment radius
//! - **Reductions** - sum, max and acceptance ranges
//! - **Livetime** - zeroing energies of channels that were off
//!
//! Every engine works on arrays of any nesting depth.

mod active_time;
mod active_volume;
mod coincidence;
pub mod geometry;
mod group;
mod r90;
mod reduce;
pub mod window;

pub use active_time::{mask_inactive, string_and_position, Run, RunRegistry, RunTable, Usability};
pub use active_volume::{cylinder_mask, first_per_group, polycone_mask, ActiveMask};
pub use coincidence::{coincidences, Gate};
pub use geometry::{Cylinder, GeometryTable, Polycone, Volume};
pub use group::{group_by_id, group_mask, NO_DETECTOR};
pub use r90::{r90, r90_of_group, CONTAINED_FRACTION};
pub use reduce::{acceptance_range, max, sum};
pub use window::Windows;
