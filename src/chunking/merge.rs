use super::types::{ChunkingStrategy, MergePlan, StepChunk};

/// Combine chunk outputs (in chunk order) into the parent step's output
///
/// Outputs beyond the number of chunks are ignored.
pub fn merge_outputs(strategy: &ChunkingStrategy, outputs: &[String]) -> String {
    match strategy.merge_plan {
        MergePlan::ConcatenateWithFileHeaders => strategy
            .chunks
            .iter()
            .zip(outputs)
            .map(|(chunk, output)| format!("{}\n{}", file_header(chunk), output.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n"),
        MergePlan::Concatenate => strategy
            .chunks
            .iter()
            .zip(outputs)
            .map(|(_, output)| output.trim_end())
            .filter(|output| !output.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        MergePlan::LastWins => outputs
            .iter()
            .take(strategy.chunks.len())
            .last()
            .cloned()
            .unwrap_or_default(),
    }
}

fn file_header(chunk: &StepChunk) -> String {
    let file = chunk
        .label
        .as_deref()
        .or_else(|| chunk.target_files.first().map(String::as_str))
        .unwrap_or(chunk.id.as_str());
    format!("// ===== FILE: {file} =====")
}
