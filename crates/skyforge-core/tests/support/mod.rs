//! Scripted stages shared by pipeline tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use skyforge_core::config::{SkyforgeConfig, parse_config_str};
use skyforge_core::credentials::{CredentialScope, ExecutionContext};
use skyforge_core::error::{DeployError, DeployResult};
use skyforge_core::render::RenderedFileSet;
use skyforge_core::stage::{OutputMap, OutputValue, Stage, StageOutputs};
use skyforge_core::terraform::VarMap;

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

pub fn local_config() -> SkyforgeConfig {
    parse_config_str("project_name: demo\nprovider: local\n").unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Tool,
    Invariant,
}

impl Failure {
    fn error(self, stage: &str) -> DeployError {
        match self {
            Failure::Tool => DeployError::tool("terraform", "apply", 1, format!("stages/{stage}")),
            Failure::Invariant => DeployError::Invariant(format!("{stage} broke")),
        }
    }
}

/// Stage that records every call as `<phase>:<name>[<scopes>]`.
#[derive(Debug)]
pub struct ScriptedStage {
    pub name: String,
    pub journal: Journal,
    pub scope: Option<CredentialScope>,
    pub fail_deploy: Option<Failure>,
    pub fail_check: Option<Failure>,
    pub fail_refresh: Option<Failure>,
    pub fail_destroy: Option<Failure>,
}

impl ScriptedStage {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            scope: None,
            fail_deploy: None,
            fail_check: None,
            fail_refresh: None,
            fail_destroy: None,
        }
    }

    pub fn exposing(mut self, scope: &str) -> Self {
        self.scope = Some(CredentialScope::new(scope).with_var(format!("{scope}_TOKEN"), "secret"));
        self
    }

    pub fn failing_deploy(mut self, failure: Failure) -> Self {
        self.fail_deploy = Some(failure);
        self
    }

    pub fn failing_check(mut self, failure: Failure) -> Self {
        self.fail_check = Some(failure);
        self
    }

    pub fn failing_refresh(mut self, failure: Failure) -> Self {
        self.fail_refresh = Some(failure);
        self
    }

    pub fn failing_destroy(mut self, failure: Failure) -> Self {
        self.fail_destroy = Some(failure);
        self
    }

    pub fn boxed(self) -> Box<dyn Stage> {
        Box::new(self)
    }

    fn log(&self, phase: &str, ctx: &ExecutionContext) {
        self.journal.lock().unwrap().push(format!(
            "{phase}:{}[{}]",
            self.name,
            ctx.scope_names().join(",")
        ));
    }

    fn own_outputs(&self) -> OutputMap {
        OutputMap::from([(
            "name".to_string(),
            OutputValue::plain(self.name.clone()),
        )])
    }
}

impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self) -> anyhow::Result<RenderedFileSet> {
        let mut files = RenderedFileSet::new();
        files.insert_generated(
            format!("stages/{}/main.tf.json", self.name),
            format!("{{\"stage\": \"{}\"}}", self.name),
        )?;
        Ok(files)
    }

    fn input_vars(&self, outputs: &StageOutputs) -> DeployResult<VarMap> {
        let seen: Vec<serde_json::Value> = outputs
            .stage_names()
            .map(|s| serde_json::Value::String(s.to_string()))
            .collect();
        Ok(VarMap::from_iter([(
            "earlier_stages".to_string(),
            serde_json::Value::Array(seen),
        )]))
    }

    fn deploy(
        &self,
        ctx: &ExecutionContext,
        _outputs: &StageOutputs,
        vars: &VarMap,
    ) -> DeployResult<OutputMap> {
        self.log("deploy", ctx);
        if let Some(failure) = self.fail_deploy {
            return Err(failure.error(&self.name));
        }
        let mut outputs = self.own_outputs();
        outputs.insert(
            "earlier_stages".to_string(),
            OutputValue::plain(vars["earlier_stages"].clone()),
        );
        if let Some(scope) = &self.scope {
            outputs.insert(
                "token".to_string(),
                OutputValue::sensitive(scope.vars().values().next().cloned().unwrap_or_default()),
            );
        }
        Ok(outputs)
    }

    fn check(&self, ctx: &ExecutionContext, _outputs: &StageOutputs) -> DeployResult<()> {
        self.log("check", ctx);
        match self.fail_check {
            Some(Failure::Tool) => Err(DeployError::validation(&self.name, "service", "unhealthy")),
            Some(failure) => Err(failure.error(&self.name)),
            None => Ok(()),
        }
    }

    fn credentials(
        &self,
        _ctx: &ExecutionContext,
        _outputs: &StageOutputs,
    ) -> DeployResult<Option<CredentialScope>> {
        Ok(self.scope.clone())
    }

    fn refresh(&self, ctx: &ExecutionContext, _outputs: &StageOutputs) -> DeployResult<OutputMap> {
        self.log("refresh", ctx);
        if let Some(failure) = self.fail_refresh {
            return Err(failure.error(&self.name));
        }
        Ok(self.own_outputs())
    }

    fn destroy(&self, ctx: &ExecutionContext, _outputs: &StageOutputs) -> DeployResult<()> {
        self.log("destroy", ctx);
        match self.fail_destroy {
            Some(failure) => Err(failure.error(&self.name)),
            None => Ok(()),
        }
    }
}
