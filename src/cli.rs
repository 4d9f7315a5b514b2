//! Command line interface: model documents → (plan | rust)
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::GenerationSettings;
use crate::contributors::Registry;
use crate::emit::{self, rust::RustBackend};
use crate::generate::{generate_all, generate_shape, GeneratedShape};
use crate::shape::{Model, ShapeId};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// synthesize constraint-enforcing value types from JSON model documents
#[derive(Parser, Debug)]
#[command(name = "shape-synth")]
pub struct CommandLineInterface {
    /// log every pipeline stage (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print the type plans as JSON
    Plan(PlanOut),
    /// render Rust source for every generated type
    Rust(RustOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JSON Pointer to select the model inside each document (e.g. /model)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document; every output is one model
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct GenerationArgs {
    /// generate only these shapes (repeatable); every declared shape if omitted
    #[arg(long = "shape")]
    shapes: Vec<String>,

    /// JSON file with generation settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// override `fanOutThreshold`
    #[arg(long)]
    fan_out_threshold: Option<u64>,

    /// accept NaN and infinities for every floating member
    #[arg(long)]
    allow_non_finite: bool,

    /// skip widened-primitive constructors
    #[arg(long)]
    no_widening: bool,
}

#[derive(clap::Parser, Debug)]
struct PlanOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    generation: GenerationArgs,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct RustOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    generation: GenerationArgs,

    /// output .rs file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    /// Every input document after pointer selection and jq filtering.
    fn load_documents(&self) -> Result<Vec<Value>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        let mut out = Vec::new();
        for source_path in source_paths {
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {}", source_path.display()))?;
            let value = serde_json::from_str::<Value>(&source)
                .with_context(|| format!("failed to parse JSON source file {}", source_path.display()))?;
            let value = match self.json_pointer.as_deref() {
                None => value,
                Some(pointer) => value
                    .pointer(pointer)
                    .cloned()
                    .ok_or_else(|| anyhow!("{}: nothing at JSON pointer {pointer}", source_path.display()))?,
            };
            match self.jq_expr.as_deref() {
                None => out.push(value),
                Some(jq_expr) => {
                    let results = crate::jq_exec::run_jaq(jq_expr, &value).with_context(|| {
                        format!("failed to apply jq expression to {}", source_path.display())
                    })?;
                    out.extend(results);
                }
            }
        }
        Ok(out)
    }

    /// One model holding the shapes of every document.
    fn load_model(&self) -> Result<Model> {
        let mut model = Model::new();
        for document in self.load_documents()? {
            let loaded = crate::source::load_model(&document)?;
            for shape in loaded.declared() {
                model.insert(shape.clone());
            }
        }
        info!(shapes = model.declared().count(), "loaded model");
        Ok(model)
    }
}

impl GenerationArgs {
    fn settings(&self) -> Result<GenerationSettings> {
        let mut settings = match &self.config {
            Some(path) => GenerationSettings::load(path)?,
            None => GenerationSettings::default(),
        };
        if let Some(n) = self.fan_out_threshold {
            settings.fan_out_threshold = n;
        }
        if self.allow_non_finite {
            settings.allow_non_finite = true;
        }
        if self.no_widening {
            settings.widen_primitives = false;
        }
        Ok(settings)
    }

    fn generate(&self, model: &Model) -> Result<Vec<GeneratedShape>> {
        let settings = self.settings()?;
        debug!(?settings, "generation settings");
        let registry = Registry::standard();
        if self.shapes.is_empty() {
            return Ok(generate_all(model, &settings, registry));
        }
        self.shapes
            .iter()
            .map(|id| {
                let id = ShapeId::new(id.as_str());
                let shape = model.get(&id).ok_or_else(|| anyhow!("unknown shape {id}"))?;
                Ok(GeneratedShape { result: generate_shape(model, shape, &settings, registry), shape: id })
            })
            .collect()
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Exit code is a failure when any shape failed to generate; the
    /// remaining shapes are still written.
    pub fn run(&self) -> Result<ExitCode> {
        let (generated, out) = match &self.cmd {
            Command::Plan(target) => {
                let model = target.input_settings.load_model()?;
                let generated = target.generation.generate(&model)?;
                let plans: IndexMap<&str, _> = generated
                    .iter()
                    .filter_map(|g| g.result.as_ref().ok().map(|p| (g.shape.as_str(), p)))
                    .collect();
                write_output(target.out.as_deref(), &serde_json::to_string_pretty(&plans)?)?;
                (generated, &target.out)
            }
            Command::Rust(target) => {
                let model = target.input_settings.load_model()?;
                let generated = target.generation.generate(&model)?;
                let mut backend = RustBackend::default();
                for plan in generated.iter().filter_map(|g| g.result.as_ref().ok()) {
                    emit::render(plan, &mut backend);
                }
                write_output(target.out.as_deref(), &backend.finish())?;
                (generated, &target.out)
            }
        };
        Ok(report(&generated, out.as_deref()))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_output(out: Option<&Path>, src: &str) -> Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, src).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            println!("{src}");
            Ok(())
        }
    }
}

fn report(generated: &[GeneratedShape], out: Option<&Path>) -> ExitCode {
    let failed: Vec<_> = generated.iter().filter_map(|g| g.result.as_ref().err().map(|e| (&g.shape, e))).collect();
    for (shape, error) in &failed {
        eprintln!("{} {}: {error}", "✗".red().bold(), shape.to_string().bold());
    }
    if let Some(out) = out {
        let ok = generated.len() - failed.len();
        eprintln!("{} {ok} type(s) written to {}", "✓".green().bold(), out.display());
    }
    if failed.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched = glob::glob(pattern)?.collect::<Result<Vec<_>, _>>()?;
            if matched.is_empty() {
                return Err(anyhow!("glob pattern matched no files: {pattern}"));
            }
            matched.sort();
            out.append(&mut matched);
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn cli(args: &[&str]) -> CommandLineInterface {
        CommandLineInterface::try_parse_from(std::iter::once("shape-synth").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn globs_expand_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.json", "{}");
        write(dir.path(), "a.json", "{}");
        let pattern = format!("{}/*.json", dir.path().display());
        let paths = resolve_file_path_patterns([pattern]).unwrap();
        let names: Vec<_> = paths.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, ["a.json", "b.json"]);
        let none = format!("{}/*.yaml", dir.path().display());
        assert!(resolve_file_path_patterns([none]).is_err());
    }

    #[test]
    fn pointer_and_jq_select_models() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "doc.json",
            r#"{"wrapped": {"models": [{"shapes": {"ex#A": {"type": "string"}}}, {"shapes": {"ex#B": {"type": "long"}}}]}}"#,
        );
        let settings = InputSettings {
            json_pointer: Some("/wrapped".into()),
            jq_expr: Some(".models[]".into()),
            input: vec![path.display().to_string()],
        };
        let model = settings.load_model().unwrap();
        assert!(model.get(&"ex#A".into()).is_some());
        assert!(model.get(&"ex#B".into()).is_some());
    }

    #[test]
    fn rust_command_writes_source_and_fails_on_bad_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(
            dir.path(),
            "model.json",
            r#"{"shapes": {
                "ex#Tags": {"type": "list", "member": {"target": "smithy.api#String"},
                            "traits": {"smithy.api#length": {"min": 1, "max": 3}}},
                "ex#Bad": {"type": "list", "member": {"target": "smithy.api#String"},
                           "traits": {"smithy.api#length": {"min": 3, "max": 1}}}
            }}"#,
        );
        let out = dir.path().join("gen/types.rs");
        let code = cli(&["rust", "-i", input.to_str().unwrap(), "-o", out.to_str().unwrap()]).run().unwrap();
        assert_eq!(code, ExitCode::FAILURE);
        let src = std::fs::read_to_string(&out).unwrap();
        assert!(src.contains("pub struct Tags {"));
        assert!(!src.contains("pub struct Bad {"));
    }

    #[test]
    fn plan_command_honours_shape_selection_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(
            dir.path(),
            "model.json",
            r#"{"shapes": {
                "ex#Age": {"type": "short", "traits": {"smithy.api#range": {"min": 0, "max": 150}}},
                "ex#Bad": {"type": "operation"}
            }}"#,
        );
        let config = write(dir.path(), "settings.json", r#"{"widenPrimitives": false}"#);
        let out = dir.path().join("plans.json");
        let code = cli(&[
            "plan",
            "-i",
            input.to_str().unwrap(),
            "--shape",
            "ex#Age",
            "--config",
            config.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ])
        .run();
        // unsupported shape types fail the whole document
        assert!(code.is_err());

        std::fs::write(&input, r#"{"shapes": {"ex#Age": {"type": "short", "traits": {"smithy.api#range": {"min": 0, "max": 150}}}}}"#)
            .unwrap();
        let args = ["plan", "-i", input.to_str().unwrap(), "--shape", "ex#Age", "--config", config.to_str().unwrap(), "-o", out.to_str().unwrap()];
        assert_eq!(cli(&args).run().unwrap(), ExitCode::SUCCESS);
        let plans: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(plans["ex#Age"]["name"], "Age");
        assert_eq!(plans["ex#Age"]["constructors"].as_array().unwrap().len(), 1);
    }
}
