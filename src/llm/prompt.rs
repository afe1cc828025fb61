//! Prompt construction.
//!
//! One prompt is built per file and shared by every model. The system
//! prompt embeds the full taxonomy so models pick from a closed vocabulary.

use crate::taxonomy::Category;
use std::path::Path;

/// A system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Build the prompt asking for the code smells in one file.
pub fn build_prompt(file_path: &str, content: &str) -> Prompt {
    let lang = fence_language(file_path);

    let user = format!(
        "Analyze this code for code smells:\n\n\
         FILE: {file_path}\n\n\
         ```{lang}\n{content}\n```\n\n\
         Provide a comprehensive analysis in JSON format as specified."
    );

    Prompt {
        system: system_prompt(),
        user,
    }
}

fn system_prompt() -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are an expert Software Engineer specialized in code quality analysis and refactoring.\n\n\
         Your task is to analyze source code and identify CODE SMELLS based on the Refactoring Guru taxonomy.\n\n\
         Use ONLY these categories and smell types:\n",
    );

    for (i, category) in Category::CANONICAL.iter().enumerate() {
        let types: Vec<String> = category
            .smell_types()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        prompt.push_str(&format!(
            "{}. {}: {}\n",
            i + 1,
            category.name().to_uppercase(),
            types.join(", ")
        ));
    }

    prompt.push_str(
        "\nFor EACH code smell found, provide:\n\
         - smell_type: The exact name of the code smell\n\
         - category: Which category it belongs to\n\
         - location: An object with file, line_start, line_end, function and class\n\
         - evidence: Specific code snippet showing the problem\n\
         - severity: Low, Medium, or High\n\
         - justification: Technical explanation of why this is a problem\n\
         - refactoring_suggestion: Concrete steps to fix it\n\
         - refactored_example: Short code example showing the improved version\n\n",
    );

    prompt.push_str(OUTPUT_CONTRACT);
    prompt
}

/// Code fence tag for a file, from its extension.
fn fence_language(file_path: &str) -> &'static str {
    match Path::new(file_path).extension().and_then(|e| e.to_str()) {
        Some("py") | Some("pyi") => "python",
        Some("rs") => "rust",
        Some("js") | Some("jsx") => "javascript",
        Some("ts") | Some("tsx") => "typescript",
        Some("java") => "java",
        Some("go") => "go",
        Some("rb") => "ruby",
        Some("c") | Some("h") => "c",
        Some("cpp") | Some("hpp") | Some("cc") => "cpp",
        _ => "",
    }
}

const OUTPUT_CONTRACT: &str = r#"Return your analysis in JSON format with this structure:
{
  "file_analyzed": "path/to/file.py",
  "total_smells_found": 1,
  "smells": [
    {
      "smell_type": "Long Method",
      "category": "Bloaters",
      "location": {
        "file": "path/to/file.py",
        "line_start": 10,
        "line_end": 150,
        "function": "process_data",
        "class": "DataProcessor"
      },
      "evidence": "def process_data():\n    # 140 lines of code...",
      "severity": "High",
      "justification": "Method has 140 lines, exceeding recommended 20-30 lines...",
      "refactoring_suggestion": "Extract smaller methods: validate_input(), transform_data(), save_result()",
      "refactored_example": "def process_data():\n    data = validate_input()\n    result = transform_data(data)\n    save_result(result)"
    }
  ]
}

Be thorough but precise. Only report actual code smells with concrete evidence.
Return only the JSON object, with no surrounding prose."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::SmellType;

    #[test]
    fn test_prompt_contains_file_and_code() {
        let prompt = build_prompt("1.0/app.py", "def f():\n    pass");
        assert!(prompt.user.contains("FILE: 1.0/app.py"));
        assert!(prompt.user.contains("```python\ndef f():\n    pass\n```"));
    }

    #[test]
    fn test_system_prompt_lists_full_taxonomy() {
        let prompt = build_prompt("a.py", "");
        for smell in SmellType::CANONICAL.iter() {
            assert!(prompt.system.contains(smell.name()), "missing {smell}");
        }
        assert!(prompt.system.contains("OBJECT-ORIENTATION ABUSERS"));
        assert!(prompt.system.contains("\"smells\""));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        assert_eq!(build_prompt("a.py", "x = 1"), build_prompt("a.py", "x = 1"));
    }

    #[test]
    fn test_unknown_extension_has_bare_fence() {
        let prompt = build_prompt("notes.txt", "hello");
        assert!(prompt.user.contains("```\nhello\n```"));
    }
}
