//! Named container of variables, PDFs, functions, datasets and model configs.
//!
//! A workspace is the unit that workflows persist and reload. It is stored as JSON.

use crate::data::Dataset;
use crate::model_config::ModelConfig;
use crate::var::RealVar;
use mf_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// PDF expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PdfNode {
    /// Truncated Gaussian in `x`.
    Gaussian {
        /// Observable.
        x: String,
        /// Mean variable.
        mean: String,
        /// Width variable.
        sigma: String,
    },
    /// `exp(c·x)` in `x`.
    Exponential {
        /// Observable.
        x: String,
        /// Slope variable.
        c: String,
    },
    /// Histogram template built from a binned dataset.
    HistPdf {
        /// Observable.
        x: String,
        /// Dataset name.
        data: String,
    },
    /// Weighted sum of PDFs. `coefs.len() == pdfs.len()` means extended yields,
    /// `coefs.len() == pdfs.len() - 1` means fractions with the last one `1 - Σ`.
    Add {
        /// Component PDFs.
        pdfs: Vec<String>,
        /// Yields or fractions (variables or functions).
        coefs: Vec<String>,
    },
    /// Normalized sum of `coef × function` terms over histogram functions; extended.
    RealSum {
        /// Component functions.
        funcs: Vec<String>,
        /// Coefficients (variables or functions).
        coefs: Vec<String>,
    },
}

impl PdfNode {
    /// Names of every object this node refers to.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::Gaussian { x, mean, sigma } => vec![x.as_str(), mean.as_str(), sigma.as_str()],
            Self::Exponential { x, c } => vec![x.as_str(), c.as_str()],
            Self::HistPdf { x, .. } => vec![x.as_str()],
            Self::Add { pdfs, coefs } => pdfs.iter().chain(coefs).map(String::as_str).collect(),
            Self::RealSum { funcs, coefs } => {
                funcs.iter().chain(coefs).map(String::as_str).collect()
            }
        }
    }

    /// Short type label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gaussian { .. } => "Gaussian",
            Self::Exponential { .. } => "Exponential",
            Self::HistPdf { .. } => "HistPdf",
            Self::Add { .. } => "AddPdf",
            Self::RealSum { .. } => "RealSumPdf",
        }
    }
}

/// Real-valued function node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FuncNode {
    /// Product of variables and functions.
    Product {
        /// Factor names.
        factors: Vec<String>,
    },
    /// Histogram as an unnormalized function of `x`.
    HistFunc {
        /// Observable.
        x: String,
        /// Dataset name.
        data: String,
    },
}

impl FuncNode {
    /// Names of every object this node refers to.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::Product { factors } => factors.iter().map(String::as_str).collect(),
            Self::HistFunc { x, .. } => vec![x.as_str()],
        }
    }
}

/// Workspace: the persisted state of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    /// Workspace name (e.g. `w`).
    pub name: String,
    #[serde(default)]
    vars: BTreeMap<String, RealVar>,
    #[serde(default)]
    pdfs: BTreeMap<String, PdfNode>,
    #[serde(default)]
    funcs: BTreeMap<String, FuncNode>,
    #[serde(default)]
    datasets: BTreeMap<String, Dataset>,
    #[serde(default)]
    sets: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    snapshots: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    model_configs: BTreeMap<String, ModelConfig>,
}

impl Workspace {
    /// Empty workspace.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// True if a variable, PDF or function has this name.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
            || self.pdfs.contains_key(name)
            || self.funcs.contains_key(name)
    }

    fn ensure_free_name(&self, name: &str) -> Result<()> {
        if self.contains(name) {
            return Err(Error::Validation(format!(
                "workspace '{}' already contains an object named '{name}'",
                self.name
            )));
        }
        Ok(())
    }

    fn ensure_exists(&self, name: &str, context: &str) -> Result<()> {
        if !self.contains(name) {
            return Err(Error::NotFound(format!("'{name}' referenced by {context}")));
        }
        Ok(())
    }

    /// Import a variable. An existing variable of the same name is replaced.
    pub fn import_var(&mut self, var: RealVar) -> Result<()> {
        if self.pdfs.contains_key(&var.name) || self.funcs.contains_key(&var.name) {
            return Err(Error::Validation(format!(
                "'{}' already names a PDF or function",
                var.name
            )));
        }
        self.vars.insert(var.name.clone(), var);
        Ok(())
    }

    /// Variable by name.
    pub fn var(&self, name: &str) -> Result<&RealVar> {
        self.vars.get(name).ok_or_else(|| Error::NotFound(format!("variable '{name}'")))
    }

    /// Mutable variable by name.
    pub fn var_mut(&mut self, name: &str) -> Result<&mut RealVar> {
        self.vars.get_mut(name).ok_or_else(|| Error::NotFound(format!("variable '{name}'")))
    }

    /// True if `name` is a variable.
    pub fn has_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// All variables.
    pub fn vars(&self) -> impl Iterator<Item = &RealVar> {
        self.vars.values()
    }

    /// Set a variable's value (clamped into its range).
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<()> {
        self.var_mut(name)?.set_value(value);
        Ok(())
    }

    /// Make a variable constant or floating.
    pub fn set_constant(&mut self, name: &str, constant: bool) -> Result<()> {
        self.var_mut(name)?.set_constant(constant);
        Ok(())
    }

    /// Import a PDF node; every referenced object must already exist.
    pub fn import_pdf(&mut self, name: impl Into<String>, node: PdfNode) -> Result<()> {
        let name = name.into();
        self.ensure_free_name(&name)?;
        let context = format!("pdf '{name}'");
        for r in node.references() {
            self.ensure_exists(r, &context)?;
        }
        match &node {
            PdfNode::HistPdf { data, .. } => self.ensure_binned(data, &context)?,
            PdfNode::Add { pdfs, coefs } => {
                if pdfs.is_empty() || !(coefs.len() == pdfs.len() || coefs.len() + 1 == pdfs.len())
                {
                    return Err(Error::Validation(format!(
                        "{context}: {} components need {} yields or {} fractions, got {}",
                        pdfs.len(),
                        pdfs.len(),
                        pdfs.len().saturating_sub(1),
                        coefs.len()
                    )));
                }
            }
            PdfNode::RealSum { funcs, coefs } => {
                if funcs.is_empty() || funcs.len() != coefs.len() {
                    return Err(Error::Validation(format!(
                        "{context}: needs one coefficient per function, got {} and {}",
                        coefs.len(),
                        funcs.len()
                    )));
                }
            }
            _ => {}
        }
        self.pdfs.insert(name, node);
        Ok(())
    }

    /// Import a function node; every referenced object must already exist.
    pub fn import_func(&mut self, name: impl Into<String>, node: FuncNode) -> Result<()> {
        let name = name.into();
        self.ensure_free_name(&name)?;
        let context = format!("function '{name}'");
        for r in node.references() {
            self.ensure_exists(r, &context)?;
        }
        if let FuncNode::HistFunc { data, .. } = &node {
            self.ensure_binned(data, &context)?;
        }
        self.funcs.insert(name, node);
        Ok(())
    }

    fn ensure_binned(&self, data: &str, context: &str) -> Result<()> {
        match self.datasets.get(data) {
            Some(Dataset::Binned(_)) => Ok(()),
            Some(Dataset::Unbinned(_)) => {
                Err(Error::Validation(format!("{context}: dataset '{data}' is not binned")))
            }
            None => Err(Error::NotFound(format!("dataset '{data}' referenced by {context}"))),
        }
    }

    /// PDF by name.
    pub fn pdf(&self, name: &str) -> Result<&PdfNode> {
        self.pdfs.get(name).ok_or_else(|| Error::NotFound(format!("pdf '{name}'")))
    }

    /// Function by name.
    pub fn func(&self, name: &str) -> Result<&FuncNode> {
        self.funcs.get(name).ok_or_else(|| Error::NotFound(format!("function '{name}'")))
    }

    /// True if `name` is a PDF.
    pub fn has_pdf(&self, name: &str) -> bool {
        self.pdfs.contains_key(name)
    }

    /// True if `name` is a function.
    pub fn has_func(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Import a dataset under `name`.
    pub fn import_data(&mut self, name: impl Into<String>, data: Dataset) -> Result<()> {
        let name = name.into();
        if self.datasets.contains_key(&name) {
            return Err(Error::Validation(format!("dataset '{name}' already exists")));
        }
        self.datasets.insert(name, data);
        Ok(())
    }

    /// Dataset by name.
    pub fn data(&self, name: &str) -> Result<&Dataset> {
        self.datasets.get(name).ok_or_else(|| Error::NotFound(format!("dataset '{name}'")))
    }

    /// Dataset names.
    pub fn data_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Define a named set of existing variables.
    pub fn define_set(&mut self, name: impl Into<String>, members: &[&str]) -> Result<()> {
        let name = name.into();
        for m in members {
            if !self.vars.contains_key(*m) {
                return Err(Error::NotFound(format!("variable '{m}' in set '{name}'")));
            }
        }
        self.sets.insert(name, members.iter().map(|s| s.to_string()).collect());
        Ok(())
    }

    /// Named set members.
    pub fn set(&self, name: &str) -> Result<&[String]> {
        self.sets
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::NotFound(format!("set '{name}'")))
    }

    /// Store the current values of `names` as a snapshot.
    pub fn save_snapshot(&mut self, name: impl Into<String>, names: &[&str]) -> Result<()> {
        let mut snap = BTreeMap::new();
        for n in names {
            snap.insert(n.to_string(), self.var(n)?.value);
        }
        self.snapshots.insert(name.into(), snap);
        Ok(())
    }

    /// Restore a snapshot into the variables.
    pub fn load_snapshot(&mut self, name: &str) -> Result<()> {
        let snap = self
            .snapshots
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("snapshot '{name}'")))?;
        self.apply_values(&snap)
    }

    /// Set several variable values at once.
    pub fn apply_values(&mut self, values: &BTreeMap<String, f64>) -> Result<()> {
        for (k, v) in values {
            self.set_value(k, *v)?;
        }
        Ok(())
    }

    /// Write fitted values and errors back into the variables.
    pub fn apply_fit(&mut self, names: &[String], values: &[f64], errors: &[f64]) -> Result<()> {
        for (i, n) in names.iter().enumerate() {
            let var = self.var_mut(n)?;
            var.set_value(values[i]);
            var.error = errors.get(i).copied().filter(|e| e.is_finite());
        }
        Ok(())
    }

    /// Import a model config; its PDF and listed parameters must exist.
    pub fn import_model_config(&mut self, mc: ModelConfig) -> Result<()> {
        if !self.pdfs.contains_key(&mc.pdf) {
            return Err(Error::NotFound(format!("pdf '{}' for model config '{}'", mc.pdf, mc.name)));
        }
        for v in mc.pois.iter().chain(&mc.nuisance).chain(&mc.observables) {
            if !self.vars.contains_key(v) {
                let msg = format!("variable '{v}' in model config '{}'", mc.name);
                return Err(Error::NotFound(msg));
            }
        }
        self.model_configs.insert(mc.name.clone(), mc);
        Ok(())
    }

    /// Model config by name.
    pub fn model_config(&self, name: &str) -> Result<&ModelConfig> {
        self.model_configs
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("model config '{name}'")))
    }

    /// Parse and execute one factory expression; returns the created object's name.
    pub fn factory(&mut self, expr: &str) -> Result<String> {
        crate::factory::execute(self, expr)
    }

    /// Persist as pretty-printed JSON.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a workspace written by [`Workspace::write_to_file`].
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Workspace({})", self.name)?;
        writeln!(f, "variables")?;
        writeln!(f, "---------")?;
        let vars: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        writeln!(f, "({})", vars.join(","))?;
        writeln!(f)?;
        writeln!(f, "p.d.f.s")?;
        writeln!(f, "-------")?;
        for (name, node) in &self.pdfs {
            writeln!(f, "{}::{name}", node.kind())?;
        }
        if !self.funcs.is_empty() {
            writeln!(f)?;
            writeln!(f, "functions")?;
            writeln!(f, "---------")?;
            for name in self.funcs.keys() {
                writeln!(f, "{name}")?;
            }
        }
        if !self.datasets.is_empty() {
            writeln!(f)?;
            writeln!(f, "datasets")?;
            writeln!(f, "--------")?;
            for (name, d) in &self.datasets {
                writeln!(f, "{}", d.describe(name))?;
            }
        }
        if !self.model_configs.is_empty() {
            writeln!(f)?;
            writeln!(f, "named objects")?;
            writeln!(f, "-------------")?;
            for name in self.model_configs.keys() {
                writeln!(f, "{name}")?;
            }
        }
        Ok(())
    }
}
