//! Learned-skill persistence and sandbox injection.
//!
//! A successful run with learning enabled produces a [`LearnedSkill`]:
//! a markdown memo describing the transformation and, in code mode,
//! the transformer script itself. Skills are persisted per slug under
//! the store root and injected into the sandbox of subsequent runs so
//! the agent can reuse (or adapt) the cached approach.
//!
//! Store layout, one directory per skill:
//!
//! ```text
//! skills/
//! +-- orders-import/
//! |   +-- skill.json     {"slug":"orders-import","schema_hash":"..."}
//! |   +-- SKILL.md       # memo
//! |   +-- transform.py   # script body (code mode only)
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use graft_types::{GraftError, LearnedSkill, Result, TransformMode};

#[derive(Debug, Serialize, Deserialize)]
struct SkillMeta {
    slug: String,
    schema_hash: String,
}

/// Sandbox-relative directory a memo is injected into.
const INJECT_DIR: &str = ".claude/skills";

/// Persists learned skills and injects them into sandboxes.
pub struct SkillStore {
    root: PathBuf,
}

impl SkillStore {
    /// Create a store rooted at `root` (created lazily on first save).
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Derive a filesystem-safe, stable slug from an endpoint name.
    pub fn slugify(name: &str) -> String {
        let mut slug = String::with_capacity(name.len());
        let mut last_dash = false;
        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash && !slug.is_empty() {
                slug.push('-');
                last_dash = true;
            }
        }
        while slug.ends_with('-') {
            slug.pop();
        }
        if slug.is_empty() {
            "skill".into()
        } else {
            slug
        }
    }

    fn skill_dir(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }

    /// Persist a skill, replacing any previous version under its slug.
    pub async fn save(&self, skill: &LearnedSkill) -> Result<()> {
        let dir = self.skill_dir(&skill.slug);
        tokio::fs::create_dir_all(&dir).await?;

        let meta = SkillMeta {
            slug: skill.slug.clone(),
            schema_hash: skill.schema_hash.clone(),
        };
        tokio::fs::write(dir.join("skill.json"), serde_json::to_string_pretty(&meta)?).await?;
        tokio::fs::write(dir.join("SKILL.md"), &skill.memo).await?;

        match &skill.script {
            Some(script) => tokio::fs::write(dir.join("transform.py"), script).await?,
            None => {
                let script_path = dir.join("transform.py");
                if script_path.exists() {
                    tokio::fs::remove_file(script_path).await?;
                }
            }
        }

        debug!(slug = %skill.slug, "skill saved");
        Ok(())
    }

    /// Load a skill by slug, or `None` when nothing is cached.
    pub async fn load(&self, slug: &str) -> Result<Option<LearnedSkill>> {
        let dir = self.skill_dir(slug);
        let meta_path = dir.join("skill.json");
        if !meta_path.exists() {
            return Ok(None);
        }

        let meta: SkillMeta = serde_json::from_str(&tokio::fs::read_to_string(&meta_path).await?)
            .map_err(|e| GraftError::Config {
                reason: format!("corrupt skill metadata for '{slug}': {e}"),
            })?;
        let memo = tokio::fs::read_to_string(dir.join("SKILL.md")).await.unwrap_or_default();

        let script_path = dir.join("transform.py");
        let script = if script_path.exists() {
            Some(tokio::fs::read_to_string(script_path).await?)
        } else {
            None
        };

        Ok(Some(LearnedSkill {
            slug: meta.slug,
            memo,
            script,
            schema_hash: meta.schema_hash,
        }))
    }

    /// Inject a cached skill into a sandbox before a run.
    ///
    /// The memo lands at `.claude/skills/<slug>/SKILL.md`; in code mode
    /// the script body is written to `./transform.py` so the agent can
    /// invoke the cached transformer directly. On schema drift the
    /// assets are injected anyway (with a warning); the validate-retry
    /// loop is responsible for correcting stale output.
    pub async fn inject(
        &self,
        slug: &str,
        work_dir: &Path,
        mode: TransformMode,
        current_schema_hash: &str,
    ) -> Result<bool> {
        let Some(skill) = self.load(slug).await? else {
            return Ok(false);
        };

        if skill.schema_hash != current_schema_hash {
            warn!(
                slug,
                cached = %skill.schema_hash,
                current = %current_schema_hash,
                "schema drift detected; injecting stale skill for adaptation"
            );
        }

        let memo_dir = work_dir.join(INJECT_DIR).join(slug);
        tokio::fs::create_dir_all(&memo_dir).await?;
        tokio::fs::write(memo_dir.join("SKILL.md"), &skill.memo).await?;

        if mode == TransformMode::Code {
            if let Some(script) = &skill.script {
                tokio::fs::write(work_dir.join("transform.py"), script).await?;
            }
        }

        debug!(slug, "skill injected into sandbox");
        Ok(true)
    }
}

/// Compose the learned-skill memo from a finished run.
pub fn compose_memo(
    model_name: &str,
    instruction: &str,
    mode: TransformMode,
    item_count: usize,
    final_notes: Option<&str>,
) -> String {
    let mode_name = match mode {
        TransformMode::Direct => "direct",
        TransformMode::Code => "code",
    };
    let notes = final_notes.unwrap_or("(no notes)").trim();
    format!(
        "# {model_name} transformation\n\n\
         {instruction}\n\n\
         ## Run facts\n\n\
         - mode: {mode_name}\n\
         - items produced: {item_count}\n\n\
         ## Approach\n\n\
         {notes}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(slug: &str, script: Option<&str>) -> LearnedSkill {
        LearnedSkill {
            slug: slug.into(),
            memo: "# memo\nconvert rows".into(),
            script: script.map(String::from),
            schema_hash: "aa".repeat(32),
        }
    }

    #[test]
    fn slugify_is_stable_and_safe() {
        assert_eq!(SkillStore::slugify("Orders Import (v2)"), "orders-import-v2");
        assert_eq!(SkillStore::slugify("orders-import"), "orders-import");
        assert_eq!(SkillStore::slugify("___"), "skill");
        // Stable across calls.
        assert_eq!(
            SkillStore::slugify("Orders Import (v2)"),
            SkillStore::slugify("Orders Import (v2)")
        );
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(dir.path().to_path_buf());

        store.save(&skill("orders", Some("print('hi')"))).await.unwrap();
        let loaded = store.load("orders").await.unwrap().unwrap();
        assert_eq!(loaded.memo, "# memo\nconvert rows");
        assert_eq!(loaded.script.as_deref(), Some("print('hi')"));
        assert_eq!(loaded.schema_hash, "aa".repeat(32));
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(dir.path().to_path_buf());
        assert!(store.load("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_without_script_removes_stale_script() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(dir.path().to_path_buf());

        store.save(&skill("orders", Some("old"))).await.unwrap();
        store.save(&skill("orders", None)).await.unwrap();
        let loaded = store.load("orders").await.unwrap().unwrap();
        assert!(loaded.script.is_none());
    }

    #[tokio::test]
    async fn inject_places_memo_and_script() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(store_dir.path().to_path_buf());
        store.save(&skill("orders", Some("print('x')"))).await.unwrap();

        let work = tempfile::tempdir().unwrap();
        let injected = store
            .inject("orders", work.path(), TransformMode::Code, &"aa".repeat(32))
            .await
            .unwrap();
        assert!(injected);
        assert!(work.path().join(".claude/skills/orders/SKILL.md").exists());
        assert!(work.path().join("transform.py").exists());
    }

    #[tokio::test]
    async fn inject_in_direct_mode_skips_script() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(store_dir.path().to_path_buf());
        store.save(&skill("orders", Some("print('x')"))).await.unwrap();

        let work = tempfile::tempdir().unwrap();
        store
            .inject("orders", work.path(), TransformMode::Direct, &"aa".repeat(32))
            .await
            .unwrap();
        assert!(work.path().join(".claude/skills/orders/SKILL.md").exists());
        assert!(!work.path().join("transform.py").exists());
    }

    #[tokio::test]
    async fn inject_on_drift_still_injects() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(store_dir.path().to_path_buf());
        store.save(&skill("orders", None)).await.unwrap();

        let work = tempfile::tempdir().unwrap();
        let injected = store
            .inject("orders", work.path(), TransformMode::Direct, "different-hash")
            .await
            .unwrap();
        assert!(injected);
        assert!(work.path().join(".claude/skills/orders/SKILL.md").exists());
    }

    #[tokio::test]
    async fn inject_missing_skill_is_noop() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(store_dir.path().to_path_buf());
        let work = tempfile::tempdir().unwrap();
        let injected = store
            .inject("nothing", work.path(), TransformMode::Direct, "h")
            .await
            .unwrap();
        assert!(!injected);
    }

    #[test]
    fn memo_includes_instruction_and_notes() {
        let memo = compose_memo(
            "Person",
            "Convert rows to Person records",
            TransformMode::Code,
            42,
            Some("Parsed the CSV header first."),
        );
        assert!(memo.contains("# Person transformation"));
        assert!(memo.contains("Convert rows to Person records"));
        assert!(memo.contains("mode: code"));
        assert!(memo.contains("items produced: 42"));
        assert!(memo.contains("Parsed the CSV header first."));
    }
}
