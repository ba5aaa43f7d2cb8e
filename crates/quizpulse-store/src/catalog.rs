//! Question catalog loaded from JSON files, one file per category.
//!
//! The catalog directory holds `<category>.json` files, each a JSON
//! array of questions. Files are read once at startup; the catalog is
//! immutable afterwards.

use std::collections::HashMap;
use std::path::Path;

use quizpulse_core::error::{QuizPulseError, Result};
use quizpulse_core::traits::QuestionCatalog;
use quizpulse_core::types::Question;
use tracing::{info, warn};

/// Immutable in-memory question catalog.
pub struct StaticCatalog {
    categories: HashMap<String, Vec<Question>>,
}

impl StaticCatalog {
    /// Build a catalog from already-loaded categories. Questions with
    /// an empty id get one derived from the category name and position.
    pub fn new(categories: Vec<(String, Vec<Question>)>) -> Self {
        let categories = categories
            .into_iter()
            .map(|(name, mut questions)| {
                assign_ids(&name, &mut questions);
                (name, questions)
            })
            .collect();
        Self { categories }
    }

    /// Load every `<category>.json` file under `dir`. Files that fail
    /// to parse are skipped with a warning; a missing directory is an
    /// error since the scheduler cannot run without questions.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(QuizPulseError::Catalog(format!(
                "catalog directory not found: {}",
                dir.display()
            )));
        }

        let mut categories: Vec<(String, Vec<Question>)> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Vec<Question>>(&raw) {
                Ok(questions) => {
                    info!(category = name, count = questions.len(), "loaded quiz category");
                    categories.push((name.to_string(), questions));
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unparseable catalog file");
                }
            }
        }

        if categories.is_empty() {
            return Err(QuizPulseError::Catalog(format!(
                "no catalog files in {}",
                dir.display()
            )));
        }
        Ok(Self::new(categories))
    }
}

fn assign_ids(category: &str, questions: &mut [Question]) {
    for (index, question) in questions.iter_mut().enumerate() {
        if question.id.is_empty() {
            question.id = format!("{category}-{index}");
        }
    }
}

impl QuestionCatalog for StaticCatalog {
    fn load(&self, category: &str) -> &[Question] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.categories.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(prompt: &str) -> Question {
        Question {
            id: String::new(),
            prompt: prompt.to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            correct_option: 0,
        }
    }

    #[test]
    fn derives_missing_ids() {
        let catalog = StaticCatalog::new(vec![(
            "ssc".to_string(),
            vec![question("q one"), question("q two")],
        )]);
        let loaded = catalog.load("ssc");
        assert_eq!(loaded[0].id, "ssc-0");
        assert_eq!(loaded[1].id, "ssc-1");
    }

    #[test]
    fn keeps_explicit_ids() {
        let mut q = question("q");
        q.id = "custom".to_string();
        let catalog = StaticCatalog::new(vec![("ssc".to_string(), vec![q])]);
        assert_eq!(catalog.load("ssc")[0].id, "custom");
    }

    #[test]
    fn unknown_category_is_empty() {
        let catalog = StaticCatalog::new(vec![("ssc".to_string(), vec![question("q")])]);
        assert!(catalog.load("nope").is_empty());
    }

    #[test]
    fn from_dir_reads_json_files() {
        let dir = std::env::temp_dir().join("quizpulse-catalog-from-dir");
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("rrb.json"),
            r#"[{"question": "2+2?", "options": ["3", "4"], "correct_option_id": 1}]"#,
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.join("broken.json"), "{ not json").unwrap();

        let catalog = StaticCatalog::from_dir(&dir).unwrap();
        assert_eq!(catalog.categories(), vec!["rrb".to_string()]);
        let loaded = catalog.load("rrb");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "rrb-0");
        assert_eq!(loaded[0].correct_option, 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn from_dir_missing_directory_errors() {
        let dir = std::env::temp_dir().join("quizpulse-catalog-missing");
        std::fs::remove_dir_all(&dir).ok();
        assert!(StaticCatalog::from_dir(&dir).is_err());
    }
}
