use crate::engine::context::ForecastContext;

use super::ai_format;
use super::response_types::StoresResponse;

pub fn execute(context: &ForecastContext) -> StoresResponse {
    ai_format::format_stores(context.catalog().stores().cloned().collect())
}
