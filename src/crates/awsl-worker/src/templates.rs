//! Workflow template discovery.
//!
//! Templates are `.awsl` files under a workflows directory; a run's
//! `graph_name` resolves to one of them by file stem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A discovered workflow template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

/// All `.awsl` files under `dir` (recursive), sorted by id.
pub fn list_templates(dir: &Path) -> io::Result<Vec<TemplateInfo>> {
    let mut templates = Vec::new();
    collect(dir, &mut templates)?;
    templates.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(templates)
}

/// Look a template up by id (file stem).
pub fn get_template(dir: &Path, identifier: &str) -> io::Result<Option<TemplateInfo>> {
    Ok(list_templates(dir)?
        .into_iter()
        .find(|t| t.id == identifier || t.name == identifier))
}

fn collect(dir: &Path, templates: &mut Vec<TemplateInfo>) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(&path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "awsl") {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            templates.push(TemplateInfo {
                id: stem.to_string(),
                name: stem.to_string(),
                path,
            });
        }
    }
    Ok(())
}
