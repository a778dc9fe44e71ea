// Library exports for asmqual
pub mod aligner;
pub mod alignment;
pub mod breakpoints;
pub mod coverage;
pub mod cs_tag;
pub mod io_utils;
pub mod length_stats;
pub mod orchestrator;
pub mod percentile;
pub mod reference;
pub mod report;
pub mod unique;
pub mod variants;
