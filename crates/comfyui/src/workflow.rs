//! Workflow templates with `{{placeholder}}` substitution.
//!
//! A template is an API-format ComfyUI workflow (the JSON exported with
//! "Save (API Format)"). String values that are exactly a placeholder are
//! replaced with a typed JSON value; placeholders embedded in longer
//! strings are replaced textually.
//!
//! | Placeholder           | Value                         |
//! |-----------------------|-------------------------------|
//! | `{{prompt}}`          | shot generation prompt        |
//! | `{{negative_prompt}}` | configured negative prompt    |
//! | `{{seed}}`            | shot seed, or a random one    |
//! | `{{num_frames}}`      | frame count                   |
//! | `{{fps}}`             | frame rate                    |
//! | `{{guidance_scale}}`  | CFG scale                     |
//! | `{{steps}}`           | inference steps               |
//! | `{{reference_image}}` | conditioning image path or "" |

use std::collections::HashMap;
use std::path::Path;

use clipforge_core::storyboard::Shot;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("failed to read workflow template {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("workflow template must be a JSON object of nodes")]
    NotAnObject,
}

#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    graph: Value,
}

impl WorkflowTemplate {
    pub fn from_value(graph: Value) -> Result<Self, WorkflowError> {
        if !graph.is_object() {
            return Err(WorkflowError::NotAnObject);
        }
        Ok(Self { graph })
    }

    pub async fn load(path: &Path) -> Result<Self, WorkflowError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WorkflowError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_value(serde_json::from_str(&text)?)
    }

    /// Render the workflow for one shot.
    pub fn render(&self, shot: &Shot, negative_prompt: &str) -> Value {
        let seed = shot.seed.unwrap_or_else(random_seed);
        let reference = shot
            .first_frame_path
            .as_deref()
            .or(shot.reference_image_path.as_deref())
            .unwrap_or("");

        let vars: HashMap<&str, Value> = HashMap::from([
            ("prompt", Value::from(shot.generation_prompt.as_str())),
            ("negative_prompt", Value::from(negative_prompt)),
            ("seed", Value::from(seed)),
            ("num_frames", Value::from(shot.num_frames)),
            ("fps", Value::from(shot.fps)),
            ("guidance_scale", Value::from(shot.guidance_scale)),
            ("steps", Value::from(shot.num_inference_steps)),
            ("reference_image", Value::from(reference)),
        ]);

        let mut graph = self.graph.clone();
        substitute(&mut graph, &vars);
        graph
    }
}

fn substitute(value: &mut Value, vars: &HashMap<&str, Value>) {
    let exact = match &*value {
        Value::String(s) => s
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .and_then(|name| vars.get(name.trim()))
            .cloned(),
        _ => None,
    };
    if let Some(replacement) = exact {
        *value = replacement;
        return;
    }

    match value {
        Value::String(s) => {
            if s.contains("{{") {
                let mut out = s.clone();
                for (name, replacement) in vars {
                    let needle = format!("{{{{{name}}}}}");
                    if out.contains(&needle) {
                        let text = match replacement {
                            Value::String(t) => t.clone(),
                            other => other.to_string(),
                        };
                        out = out.replace(&needle, &text);
                    }
                }
                *s = out;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute(v, vars)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute(v, vars)),
        _ => {}
    }
}

/// Seed for shots that do not pin one.
fn random_seed() -> u64 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    // Keep within 2^53 so JSON consumers using doubles see the exact value.
    u64::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6] & 0x1f, 0])
}
