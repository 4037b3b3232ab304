/// Optimal detection-to-track assignment (Hungarian method)
///
pub mod assignment;

/// Tracker of all objects of one class
///
pub mod multi_target;

/// Tracker options and builder
pub mod options;

/// Simplified tracker of a single object
pub mod single_target;
