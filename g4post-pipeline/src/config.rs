//! Run configuration: where to read, where to write, and what to run.

use crate::descriptor::ModuleDescriptor;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// How per-file results are persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// One output file per input file, inside the output folder.
    #[default]
    PerFile,
    /// One combined output file, concatenated in input order.
    Summarize,
}

impl Mode {
    /// Parses the `para.mode` value; an empty string selects [`Mode::PerFile`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "" | "per_file" => Some(Self::PerFile),
            "summarize" => Some(Self::Summarize),
            _ => None,
        }
    }
}

/// Container format of written files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Hdf5,
}

impl OutputFormat {
    /// Parses a format name (`json`, `hdf5`, `h5`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "hdf5" | "h5" => Some(Self::Hdf5),
            _ => None,
        }
    }

    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Hdf5 => "hdf5",
        }
    }
}

/// Input tree and the context variables read from it.
#[derive(Clone, Debug, PartialEq)]
pub struct InputSpec {
    pub tree: String,
    /// Context variable name to `tree/branch` path.
    pub variables: BTreeMap<String, String>,
}

impl InputSpec {
    /// Branch name for a `tree/branch` path: its last `/` component.
    #[must_use]
    pub fn branch_name(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }

    /// `(context variable, branch)` pairs in variable order.
    pub fn branches(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables
            .iter()
            .map(|(var, path)| (var.as_str(), Self::branch_name(path)))
    }
}

/// A fully loaded and validated run configuration.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub input_folder: PathBuf,
    /// Extension of input files, without the dot.
    pub input_format: String,
    /// Output folder, or the combined output file in [`Mode::Summarize`].
    pub output: PathBuf,
    pub output_format: OutputFormat,
    pub threads: usize,
    pub mode: Mode,
    /// Rows per batch; `None` sizes batches from available memory.
    pub step_size: Option<usize>,
    /// Share of available memory a batch may use when `step_size` is unset.
    pub memory_fraction: f64,
    pub input: InputSpec,
    /// Context variables written to the output, in order.
    pub outputs: Vec<String>,
    pub pipeline: Pipeline,
}

/// Default share of available memory for automatically sized batches.
pub const DEFAULT_MEMORY_FRACTION: f64 = 0.25;

#[derive(Deserialize)]
struct JsonConfig {
    io: JsonIo,
    #[serde(default)]
    para: JsonPara,
    input: JsonInput,
    output: Vec<String>,
    #[serde(default)]
    modules: Vec<ModuleDescriptor>,
}

#[derive(Deserialize)]
struct JsonIo {
    input: JsonInputFiles,
    output: PathBuf,
    #[serde(default)]
    output_format: Option<String>,
}

#[derive(Deserialize)]
struct JsonInputFiles {
    folder: PathBuf,
    format: String,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonPara {
    threads: usize,
    mode: String,
    step_size: Option<usize>,
    memory_fraction: f64,
}

impl Default for JsonPara {
    fn default() -> Self {
        Self {
            threads: 1,
            mode: String::new(),
            step_size: None,
            memory_fraction: DEFAULT_MEMORY_FRACTION,
        }
    }
}

#[derive(Deserialize)]
struct JsonInput {
    tree: String,
    var: BTreeMap<String, String>,
}

impl RunConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, is not valid JSON, or
    /// describes an invalid pipeline.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let json_config: JsonConfig = serde_json::from_reader(BufReader::new(file))?;
        Self::from_json_config(json_config)
    }

    /// Loads and validates a configuration from a JSON string.
    ///
    /// # Errors
    /// See [`RunConfig::from_file`].
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_config(json_config)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        let mode = Mode::from_name(&config.para.mode)
            .ok_or_else(|| Error::Config(format!("unknown mode `{}`", config.para.mode)))?;
        let output_format = match &config.io.output_format {
            None => OutputFormat::default(),
            Some(name) => OutputFormat::from_name(name)
                .ok_or_else(|| Error::Config(format!("unknown output format `{name}`")))?,
        };
        if config.para.threads == 0 {
            return Err(Error::Config("threads must be at least 1".to_string()));
        }
        if config.para.step_size == Some(0) {
            return Err(Error::Config("step_size must be at least 1".to_string()));
        }
        let fraction = config.para.memory_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(Error::Config(format!(
                "memory_fraction must be in (0, 1], got {fraction}"
            )));
        }

        let input = InputSpec {
            tree: config.input.tree,
            variables: config.input.var,
        };
        let pipeline = Pipeline::from_descriptors(config.modules)?;
        let initial = || input.variables.keys().map(String::as_str);
        pipeline.check_variables(initial())?;
        pipeline.check_outputs(initial(), config.output.iter().map(String::as_str))?;

        Ok(Self {
            input_folder: config.io.input.folder,
            input_format: config.io.input.format.trim_start_matches('.').to_string(),
            output: config.io.output,
            output_format,
            threads: config.para.threads,
            mode,
            step_size: config.para.step_size,
            memory_fraction: fraction,
            input,
            outputs: config.output,
            pipeline,
        })
    }
}
