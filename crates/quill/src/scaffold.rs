//! Application scaffolding for agent mode
//!
//! One structured-generation call produces a full application plan; the plan
//! is validated and rendered before anything touches the filesystem.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::llm::{ModelClient, ToolDefinition};

const PLAN_TOOL_NAME: &str = "create_application";

const PLANNER_SYSTEM_PROMPT: &str = "\
You are an expert software engineer generating complete, runnable applications.

Requirements for every plan:
- Every file is complete and functional: all imports present, no placeholders or TODOs.
- Follow the conventions of the chosen language and framework, including its standard project layout.
- Keep dependencies minimal and pin exact versions.
- Include a README.md with setup instructions and a .gitignore suited to the stack.
- Setup commands run in order from inside the project folder and end with the application running.

Respond by calling the create_application tool with the full plan.";

/// Structured plan the model fills in for one application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationPlan {
    pub folder_name: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<PlannedFile>,
    #[serde(default)]
    pub setup_commands: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

pub fn plan_tool() -> ToolDefinition {
    ToolDefinition {
        name: PLAN_TOOL_NAME.to_string(),
        description: "Emit the complete plan for the requested application".to_string(),
        input_schema: plan_schema(),
    }
}

fn plan_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "folder_name": {
                "type": "string",
                "description": "Kebab-case folder name for the application"
            },
            "description": {
                "type": "string",
                "description": "Brief description of what was created"
            },
            "files": {
                "type": "array",
                "description": "Every file the application needs",
                "items": {
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Relative file path (e.g. src/app.js)"
                        },
                        "content": {
                            "type": "string",
                            "description": "Complete file content"
                        }
                    },
                    "required": ["path", "content"]
                }
            },
            "setup_commands": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Shell commands to set up and run the application, in order"
            },
            "dependencies": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "version": {"type": "string"}
                    },
                    "required": ["name", "version"]
                },
                "description": "Packages with pinned versions"
            }
        },
        "required": ["folder_name", "description", "files", "setup_commands"]
    })
}

/// Ask the model for a full application plan
pub async fn generate_plan(client: &ModelClient, description: &str) -> Result<ApplicationPlan> {
    let prompt = format!(
        "Generate a complete, production-ready application for this description: \"{description}\""
    );
    let plan: ApplicationPlan = client
        .generate_object(Some(PLANNER_SYSTEM_PROMPT), &prompt, plan_tool())
        .await?;
    if plan.files.is_empty() {
        bail!("The model returned an application plan with no files");
    }
    Ok(plan)
}

/// Write the plan under `base_dir/{folder_name}`, creating directories as
/// needed and overwriting existing files. The whole plan is validated before
/// the first write.
pub fn materialize(plan: &ApplicationPlan, base_dir: &Path) -> Result<PathBuf> {
    if plan.files.is_empty() {
        bail!("Application plan contains no files");
    }
    if plan.folder_name.is_empty() {
        bail!("Application plan has no folder name");
    }
    ensure_relative(&plan.folder_name)?;
    for file in &plan.files {
        ensure_relative(&file.path)?;
    }

    let app_dir = base_dir.join(&plan.folder_name);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("Failed to create {}", app_dir.display()))?;

    for file in &plan.files {
        let path = app_dir.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, &file.content)
            .with_context(|| format!("Failed to write {}", file.path))?;
        debug!("Created file {}", file.path);
    }

    Ok(app_dir)
}

fn ensure_relative(path: &str) -> Result<()> {
    let candidate = Path::new(path);
    if candidate.is_absolute()
        || candidate
            .components()
            .any(|component| matches!(component, Component::ParentDir))
    {
        bail!("Plan contains an unsafe file path: {path}");
    }
    Ok(())
}

/// Render the prospective layout with the folder as the root line.
/// Directories print before files, each group in declaration order.
pub fn render_file_tree(plan: &ApplicationPlan) -> String {
    let mut root = TreeNode::default();
    for file in &plan.files {
        let mut node = &mut root;
        let mut parts = file.path.split('/').filter(|p| !p.is_empty()).peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                node.files.push(part.to_string());
            } else {
                node = node.child(part);
            }
        }
    }

    let mut out = format!("{}/\n", plan.folder_name);
    render_node(&root, "", &mut out);
    out
}

#[derive(Default)]
struct TreeNode {
    dirs: Vec<(String, TreeNode)>,
    files: Vec<String>,
}

impl TreeNode {
    fn child(&mut self, name: &str) -> &mut TreeNode {
        let idx = match self.dirs.iter().position(|(dir, _)| dir == name) {
            Some(idx) => idx,
            None => {
                self.dirs.push((name.to_string(), TreeNode::default()));
                self.dirs.len() - 1
            }
        };
        &mut self.dirs[idx].1
    }
}

fn render_node(node: &TreeNode, prefix: &str, out: &mut String) {
    for (index, (name, child)) in node.dirs.iter().enumerate() {
        let is_last = index + 1 == node.dirs.len() && node.files.is_empty();
        let connector = if is_last { "└── " } else { "├── " };
        let extension = if is_last { "    " } else { "│   " };
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(name);
        out.push_str("/\n");
        render_node(child, &format!("{prefix}{extension}"), out);
    }
    for (index, name) in node.files.iter().enumerate() {
        let connector = if index + 1 == node.files.len() {
            "└── "
        } else {
            "├── "
        };
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(name);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn plan(folder: &str, files: Vec<(&str, &str)>) -> ApplicationPlan {
        ApplicationPlan {
            folder_name: folder.to_string(),
            description: "test app".to_string(),
            files: files
                .into_iter()
                .map(|(path, content)| PlannedFile {
                    path: path.to_string(),
                    content: content.to_string(),
                })
                .collect(),
            setup_commands: vec!["npm install".to_string()],
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn test_materialize_writes_nested_files() {
        let base = tempdir().unwrap();
        let plan = plan("demo", vec![("a/b.txt", "x"), ("a/c.txt", "y")]);

        let app_dir = materialize(&plan, base.path()).unwrap();

        assert_eq!(app_dir, base.path().join("demo"));
        assert_eq!(fs::read_to_string(app_dir.join("a/b.txt")).unwrap(), "x");
        assert_eq!(fs::read_to_string(app_dir.join("a/c.txt")).unwrap(), "y");
    }

    #[test]
    fn test_empty_plan_rejected_before_writes() {
        let base = tempdir().unwrap();
        let plan = plan("demo", vec![]);

        let err = materialize(&plan, base.path()).unwrap_err();

        assert!(err.to_string().contains("no files"));
        assert!(!base.path().join("demo").exists());
    }

    #[test]
    fn test_materialize_overwrites_existing_file() {
        let base = tempdir().unwrap();
        fs::create_dir_all(base.path().join("demo")).unwrap();
        fs::write(base.path().join("demo/app.js"), "old").unwrap();

        let plan = plan("demo", vec![("app.js", "new")]);
        materialize(&plan, base.path()).unwrap();

        assert_eq!(
            fs::read_to_string(base.path().join("demo/app.js")).unwrap(),
            "new"
        );
    }

    #[test]
    fn test_escaping_paths_rejected_before_writes() {
        let base = tempdir().unwrap();
        let plan = plan("demo", vec![("ok.txt", "fine"), ("../evil.txt", "nope")]);

        let err = materialize(&plan, base.path()).unwrap_err();

        assert!(err.to_string().contains("unsafe"));
        assert!(!base.path().join("demo").exists());
        assert!(!base.path().join("evil.txt").exists());

        let absolute = super::ensure_relative("/etc/passwd");
        assert!(absolute.is_err());
    }

    #[test]
    fn test_render_file_tree_groups_and_orders() {
        let plan = plan(
            "web-app",
            vec![
                ("src/main.js", ""),
                ("src/util.js", ""),
                ("index.html", ""),
                ("assets/logo.svg", ""),
            ],
        );

        let rendered = render_file_tree(&plan);

        let expected = "\
web-app/
├── src/
│   ├── main.js
│   └── util.js
├── assets/
│   └── logo.svg
└── index.html
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_plan_deserializes_with_optional_sections() {
        let raw = serde_json::json!({
            "folder_name": "api",
            "description": "an api",
            "files": [{"path": "main.py", "content": "print('hi')"}]
        });

        let plan: ApplicationPlan = serde_json::from_value(raw).unwrap();

        assert_eq!(plan.folder_name, "api");
        assert!(plan.setup_commands.is_empty());
        assert!(plan.dependencies.is_empty());
        assert_eq!(plan.files.len(), 1);
    }
}
