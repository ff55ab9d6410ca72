// Core algorithms, leaves first. Everything here is synchronous and operates
// on in-memory frames; I/O and scheduling live one level up.

pub mod frame;
pub mod filter;
pub mod mask;
pub mod gradient;
pub mod boundary;
pub mod region_stats;
pub mod sky_detector;
pub mod depth_sky;
pub mod placement;
pub mod smoke_patch;
pub mod compositor;
pub mod label;
