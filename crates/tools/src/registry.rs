use crate::spec::ToolSpec;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateName(String),
    #[error("Code reference {code_ref} already registered by {existing}")]
    DuplicateCodeRef { code_ref: String, existing: String },
}

/// Registered tools, addressable by name or by code reference.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolSpec>>,
    by_code_ref: HashMap<String, String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            by_code_ref: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: ToolSpec) -> Result<&mut Self, RegistryError> {
        if self.tools.contains_key(tool.name()) {
            return Err(RegistryError::DuplicateName(tool.name().to_string()));
        }
        if let Some(existing) = self.by_code_ref.get(tool.code_ref()) {
            return Err(RegistryError::DuplicateCodeRef {
                code_ref: tool.code_ref().to_string(),
                existing: existing.clone(),
            });
        }

        self.by_code_ref
            .insert(tool.code_ref().to_string(), tool.name().to_string());
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolSpec>> {
        self.tools.get(name).cloned()
    }

    pub fn get_by_code_ref(&self, code_ref: &str) -> Option<Arc<ToolSpec>> {
        self.by_code_ref
            .get(code_ref)
            .and_then(|name| self.tools.get(name))
            .cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    pub fn schemas(&self) -> Vec<serde_json::Value> {
        self.tools
            .values()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "codeRef": tool.code_ref(),
                    "description": tool.description(),
                    "parameters": tool.params_contract().map(|contract| contract.schema().clone()),
                    "policies": tool
                        .policies()
                        .slots()
                        .iter()
                        .map(|slot| slot.package_name().to_string())
                        .collect::<Vec<_>>(),
                })
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
