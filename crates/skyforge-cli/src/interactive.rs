//! Terminal prompts for deploy, destroy and upgrade.
//!
//! Uses dialoguer for confirmation prompts; every prompt can be bypassed
//! from the command line for non-interactive runs.

use std::io::{self, Write};

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};

pub struct Prompter<W: Write = io::Stdout> {
    /// Output writer (for testing)
    writer: W,
    theme: ColorfulTheme,
}

impl Prompter<io::Stdout> {
    pub fn new() -> Self {
        Self {
            writer: io::stdout(),
            theme: ColorfulTheme::default(),
        }
    }
}

impl<W: Write> Prompter<W> {
    #[cfg(test)]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            theme: ColorfulTheme::default(),
        }
    }

    pub fn confirm_deploy(self, project_name: &str, stages: usize) -> Result<bool> {
        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt(format!("Deploy {stages} stages of {project_name}?"))
            .default(true)
            .interact()?;
        Ok(confirmed)
    }

    /// Ask the operator to type the project name before destroying it.
    pub fn confirm_destroy(mut self, project_name: &str) -> Result<bool> {
        self.print_destroy_warning(project_name)?;

        let proceed = Confirm::with_theme(&self.theme)
            .with_prompt("Destroy every stage of this deployment?")
            .default(false)
            .interact()?;
        if !proceed {
            return Ok(false);
        }

        let typed: String = Input::with_theme(&self.theme)
            .with_prompt("Type the project name to confirm")
            .allow_empty(true)
            .interact_text()?;
        Ok(typed.trim() == project_name)
    }

    fn print_destroy_warning(&mut self, project_name: &str) -> Result<()> {
        writeln!(self.writer)?;
        writeln!(
            self.writer,
            "{}",
            style("  Destroy deployment").bold().red()
        )?;
        writeln!(self.writer, "  ───────────────────────────")?;
        writeln!(self.writer, "  Project:  {}", style(project_name).yellow())?;
        writeln!(
            self.writer,
            "  All cloud resources and data of this deployment will be deleted."
        )?;
        writeln!(self.writer)?;
        Ok(())
    }

    /// Show an upgrade notice and, unless `skip_ack`, wait for acknowledgement.
    pub fn notice(&mut self, message: &str, skip_ack: bool) -> Result<()> {
        writeln!(self.writer, "{} {message}", style("Notice:").yellow().bold())?;
        if skip_ack {
            return Ok(());
        }
        Confirm::with_theme(&self.theme)
            .with_prompt("Acknowledged?")
            .default(true)
            .interact()?;
        Ok(())
    }

    #[cfg(test)]
    fn into_writer(self) -> W {
        self.writer
    }
}
