//! Infer command: scores one frame with the configured inference service.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use le_client::InferenceClient;
use le_core::{InferenceResponse, LectureId};

use crate::Config;

pub fn format_response(response: &InferenceResponse) -> String {
    if !response.calibrated {
        return "Calibrating: no score yet".to_string();
    }
    let attention = response
        .attention
        .map_or_else(|| "none".to_string(), |score| format!("{score:.1}"));
    let state = response
        .state
        .map_or_else(|| "none".to_string(), |state| state.to_string());
    format!("Attention: {attention}\nState: {state}")
}

pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    frame: &Path,
    lecture_id: &LectureId,
) -> Result<()> {
    let bytes =
        std::fs::read(frame).with_context(|| format!("failed to read {}", frame.display()))?;
    if bytes.len() < config.viewer.min_frame_bytes {
        tracing::warn!(
            bytes = bytes.len(),
            min = config.viewer.min_frame_bytes,
            "frame is smaller than the viewer would send"
        );
    }

    let client = InferenceClient::new(&config.client.inference_url, config.client.timeout())?;
    let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
    let response = rt
        .block_on(client.infer(bytes, lecture_id))
        .with_context(|| format!("inference failed at {}", config.client.inference_url))?;

    writeln!(writer, "{}", format_response(&response))?;
    Ok(())
}
