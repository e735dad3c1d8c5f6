//! System prompt templates for the two run modes.
//!
//! The orchestrator interpolates the output file name and a stringified
//! schema description; nothing else varies per run.

const DIRECT_MODE_PROMPT: &str = "You are an expert data transformer.

Your task is to transform input files into a specific output format that matches a schema.

## Instructions

1. First, explore the input files in the working directory (list_files, read_file)
2. Transform the data according to the user's instruction
3. Write the transformed data to {output_file} with write_file
   - For json format: Write a single JSON object
   - For jsonl format: Write one JSON object per line (no array wrapper)
4. Call validate_artifact to check your output against the schema
5. If validation fails, read the errors, fix your output, and try again

## Output Schema

{schema_json}

## Important

- Always validate your output before finishing
- Fix all validation errors - the output MUST pass validation
- For jsonl format, each line must be a complete, valid JSON object
- Do not wrap jsonl output in an array - each line is independent
";

const CODE_MODE_PROMPT: &str = "You are an expert data transformer.

Your task is to write a script that transforms input files into a validated output format.

## Instructions

1. First, explore the input files in the working directory (list_files, read_file)
2. Write a transformer script to ./transform.py with write_file
3. Call run_transformer to execute your script
4. Call validate_artifact to check the output against the schema
5. If validation fails, fix your script and repeat steps 3-4

## Output Schema

{schema_json}

## transform.py Contract

Your script should:
- Read input files from the working directory
- Write output to {output_file}
  - For json format: a single JSON document
  - For jsonl format: one JSON object per line
- Use the standard library (csv, json) or simple parsing
- Handle errors gracefully with clear error messages

## Important

- Always validate your output before finishing
- Fix all validation errors - the output MUST pass validation
- Keep code simple and readable
";

/// Build the system prompt for a run.
pub fn build_system_prompt(code_mode: bool, output_file: &str, schema_json: &str) -> String {
    let template = if code_mode { CODE_MODE_PROMPT } else { DIRECT_MODE_PROMPT };
    template
        .replace("{output_file}", output_file)
        .replace("{schema_json}", schema_json)
}

/// Instruction wrapper for the first chunk of a chunked run.
pub fn first_chunk_instruction(base_instruction: &str, chunk_size: usize) -> String {
    format!(
        "{base_instruction}

## Chunked Generation Mode

This is chunk 1 of a multi-chunk generation. Generate the FIRST {chunk_size} items.

Focus on:
1. Establishing consistent patterns and naming conventions
2. Creating a diverse, representative sample
3. Following the schema exactly

Generate up to {chunk_size} items. If the input has fewer items, generate all of them.
"
    )
}

/// Instruction wrapper for continuation chunks, carrying overlap
/// context from the previous chunk for style consistency.
pub fn continuation_instruction(
    base_instruction: &str,
    chunk_size: usize,
    items_so_far: usize,
    context_items: &[serde_json::Value],
) -> String {
    let context_json = serde_json::to_string_pretty(context_items)
        .unwrap_or_else(|_| "(context serialization failed)".into());
    let next_item = items_so_far + 1;
    let context_len = context_items.len();

    format!(
        "{base_instruction}

## Chunked Generation Mode - Continuation

This is a CONTINUATION of a multi-chunk generation.

**Progress:** {items_so_far} items already generated.

**Generate next:** Up to {chunk_size} items (items {next_item}+)

**Last {context_len} items from previous chunk (maintain consistency):**
```json
{context_json}
```

CRITICAL REQUIREMENTS:
1. Continue the established patterns and naming conventions
2. Do NOT repeat any items already generated
3. Maintain referential consistency if items reference each other
4. Generate up to {chunk_size} NEW items
5. If you've processed all input data, generate fewer items or stop

Start generating from item {next_item}.
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_prompt_interpolates_both_slots() {
        let prompt = build_system_prompt(false, "./output.jsonl", "{\"title\": \"Person\"}");
        assert!(prompt.contains("./output.jsonl"));
        assert!(prompt.contains("\"Person\""));
        assert!(!prompt.contains("{output_file}"));
        assert!(!prompt.contains("{schema_json}"));
        assert!(!prompt.contains("run_transformer"));
    }

    #[test]
    fn code_prompt_mentions_the_script_runner() {
        let prompt = build_system_prompt(true, "./output.json", "{}");
        assert!(prompt.contains("run_transformer"));
        assert!(prompt.contains("./transform.py"));
    }

    #[test]
    fn first_chunk_names_the_budget() {
        let text = first_chunk_instruction("Convert rows.", 100);
        assert!(text.starts_with("Convert rows."));
        assert!(text.contains("FIRST 100 items"));
    }

    #[test]
    fn continuation_carries_progress_and_context() {
        let context = vec![json!({"name": "P99"})];
        let text = continuation_instruction("Convert rows.", 50, 100, &context);
        assert!(text.contains("**Progress:** 100 items already generated."));
        assert!(text.contains("items 101+"));
        assert!(text.contains("P99"));
        assert!(text.contains("Start generating from item 101."));
    }
}
