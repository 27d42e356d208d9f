//! Turning feed summaries into AQI values.
//!
//! - [`prompt`] - summary selection and the instruction appended to it
//! - [`reading`] - parsing the model reply into categorized readings
//! - [`pipeline`] - the fetch, prompt, generate, parse sequence behind
//!   `/aqi-info`

mod pipeline;
mod prompt;
mod reading;

pub use pipeline::{AqiPipeline, AqiReport, FeedStatus, PipelineError};
pub use prompt::{build_prompt, select_summary, INSTRUCTION, SUMMARY_SEPARATOR};
pub use reading::{parse_aqi_values, AqiCategory, AqiParseError, AqiReading, EXPECTED_AQI_VALUES};
