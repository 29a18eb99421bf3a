//! Compiled likelihood: a workspace PDF resolved into an evaluable model.
//!
//! Compilation folds constants, assigns every floating variable reachable from the PDF
//! a slot in the parameter vector (in the order the PDF first references them), and
//! turns the node graph into a tree of shapes and mixtures. Mixtures are evaluated with
//! a stabilized log-sum-exp; gradients are analytic and chained through coefficient
//! products.
//!
//! Outside the physical region (non-positive total yield, fractions off the simplex, a
//! negative mixture density at an event or bin) the NLL is `+∞`.

use crate::data::{BinnedData, Dataset};
use crate::math::LOG_FLOOR;
use crate::pdf::{ExponentialPdf, GaussianPdf, HistogramPdf, ShapePdf};
use crate::var::RealVar;
use crate::workspace::{FuncNode, PdfNode, Workspace};
use mf_core::{Error, FixedParamModel, LogDensityModel, PoiModel, PreparedModelRef, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A floating parameter of a compiled model.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Variable name.
    pub name: String,
    /// Starting value.
    pub init: f64,
    /// Allowed range.
    pub bounds: (f64, f64),
}

/// Coefficient expression over the parameter vector.
#[derive(Debug, Clone)]
pub(crate) enum Coef {
    Const(f64),
    Param(usize),
    Product(Vec<Coef>),
}

impl Coef {
    fn value(&self, p: &[f64]) -> f64 {
        match self {
            Self::Const(v) => *v,
            Self::Param(i) => p[*i],
            Self::Product(fs) => fs.iter().map(|f| f.value(p)).product(),
        }
    }

    /// `out += scale * ∂coef/∂θ`.
    fn accumulate_grad(&self, p: &[f64], scale: f64, out: &mut [f64]) {
        match self {
            Self::Const(_) => {}
            Self::Param(i) => out[*i] += scale,
            Self::Product(fs) => {
                for (j, f) in fs.iter().enumerate() {
                    if f.is_const() {
                        continue;
                    }
                    let others: f64 = fs
                        .iter()
                        .enumerate()
                        .filter(|(k, _)| *k != j)
                        .map(|(_, g)| g.value(p))
                        .product();
                    f.accumulate_grad(p, scale * others, out);
                }
            }
        }
    }

    fn is_const(&self) -> bool {
        match self {
            Self::Const(_) => true,
            Self::Param(_) => false,
            Self::Product(fs) => fs.iter().all(Coef::is_const),
        }
    }

    fn dense_grad(&self, p: &[f64], dim: usize) -> Vec<f64> {
        let mut g = vec![0.0; dim];
        self.accumulate_grad(p, 1.0, &mut g);
        g
    }
}

/// Points at which a shape is evaluated: event values or bin edges.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Atoms<'a> {
    Events(&'a [f64]),
    Bins(&'a [f64]),
}

impl Atoms<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Events(xs) => xs.len(),
            Self::Bins(edges) => edges.len().saturating_sub(1),
        }
    }
}

/// Node of the compiled PDF tree.
#[derive(Debug, Clone)]
pub(crate) enum Shape {
    Leaf { name: String, pdf: Arc<dyn ShapePdf>, params: Vec<Coef> },
    Mixture { name: String, components: Vec<Shape>, coefs: Vec<Coef>, yields: bool },
}

impl Shape {
    fn name(&self) -> &str {
        match self {
            Self::Leaf { name, .. } | Self::Mixture { name, .. } => name,
        }
    }

    /// Mixture weights and their gradients (row-major `K × dim`).
    fn weights_grad(&self, p: &[f64], dim: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let Self::Mixture { name, components, coefs, yields } = self else {
            return Ok((vec![1.0], vec![0.0; dim]));
        };
        let k = components.len();
        let mut w = vec![0.0; k];
        let mut dw = vec![0.0; k * dim];
        if *yields {
            let nu: Vec<f64> = coefs.iter().map(|c| c.value(p)).collect();
            if nu.iter().any(|v| !v.is_finite()) {
                return Err(Error::Computation(format!(
                    "pdf '{name}': yields must be finite, got {nu:?}"
                )));
            }
            // Individual yields may be negative; the per-atom density is checked below.
            let total: f64 = nu.iter().sum();
            if total <= 0.0 {
                return Err(Error::Computation(format!(
                    "pdf '{name}': total yield must be > 0, got {total}"
                )));
            }
            let mut dtotal = vec![0.0; dim];
            let dnu: Vec<Vec<f64>> = coefs.iter().map(|c| c.dense_grad(p, dim)).collect();
            for d in &dnu {
                for t in 0..dim {
                    dtotal[t] += d[t];
                }
            }
            for j in 0..k {
                w[j] = nu[j] / total;
                for t in 0..dim {
                    dw[j * dim + t] = dnu[j][t] / total - nu[j] * dtotal[t] / (total * total);
                }
            }
        } else {
            let mut rest = 1.0;
            for (j, c) in coefs.iter().enumerate() {
                let f = c.value(p);
                if !f.is_finite() || f < 0.0 {
                    return Err(Error::Computation(format!(
                        "pdf '{name}': fraction {j} must be finite and >= 0, got {f}"
                    )));
                }
                w[j] = f;
                rest -= f;
                c.accumulate_grad(p, 1.0, &mut dw[j * dim..(j + 1) * dim]);
                c.accumulate_grad(p, -1.0, &mut dw[(k - 1) * dim..k * dim]);
            }
            if rest < -1e-12 {
                return Err(Error::Computation(format!(
                    "pdf '{name}': fractions sum to {} > 1",
                    1.0 - rest
                )));
            }
            w[k - 1] = rest.max(0.0);
        }
        Ok((w, dw))
    }

    /// True while every mixture weight set is physical: finite yields with a positive
    /// total, or finite non-negative fractions summing to at most one.
    fn feasible(&self, p: &[f64]) -> bool {
        let Self::Mixture { components, coefs, yields, .. } = self else {
            return true;
        };
        let v: Vec<f64> = coefs.iter().map(|c| c.value(p)).collect();
        let sum: f64 = v.iter().sum();
        let weights_ok = if *yields {
            v.iter().all(|x| x.is_finite()) && sum > 0.0
        } else {
            v.iter().all(|x| x.is_finite() && *x >= 0.0) && sum <= 1.0 + 1e-12
        };
        weights_ok && components.iter().all(|c| c.feasible(p))
    }

    /// Total expected yield and its gradient for an extended mixture.
    fn total_yield(&self, p: &[f64], dim: usize) -> Result<(f64, Vec<f64>)> {
        match self {
            Self::Mixture { coefs, yields: true, .. } => {
                let mut dv = vec![0.0; dim];
                let mut v = 0.0;
                for c in coefs {
                    v += c.value(p);
                    c.accumulate_grad(p, 1.0, &mut dv);
                }
                Ok((v, dv))
            }
            _ => Err(Error::Computation(format!("pdf '{}' is not extended", self.name()))),
        }
    }

    /// Evaluate log-probabilities (and optionally gradients, row-major `n × dim`).
    fn eval(
        &self,
        atoms: Atoms<'_>,
        bounds: (f64, f64),
        p: &[f64],
        dim: usize,
        out_logp: &mut [f64],
        out_grad: Option<&mut [f64]>,
    ) -> Result<()> {
        let n = atoms.len();
        match self {
            Self::Leaf { pdf, params, .. } => {
                let vals: Vec<f64> = params.iter().map(|c| c.value(p)).collect();
                let np = pdf.n_params();
                let Some(out_grad) = out_grad else {
                    return match atoms {
                        Atoms::Events(xs) => pdf.log_prob_batch(xs, bounds, &vals, out_logp),
                        Atoms::Bins(edges) => {
                            pdf.bin_log_prob_grad(edges, bounds, &vals, out_logp, None)
                        }
                    };
                };
                let mut local = vec![0.0; n * np];
                let grad = Some(local.as_mut_slice());
                match atoms {
                    Atoms::Events(xs) => {
                        pdf.log_prob_grad_batch(xs, bounds, &vals, out_logp, grad)?
                    }
                    Atoms::Bins(edges) => {
                        pdf.bin_log_prob_grad(edges, bounds, &vals, out_logp, grad)?
                    }
                }
                out_grad.fill(0.0);
                for (j, c) in params.iter().enumerate() {
                    if c.is_const() {
                        continue;
                    }
                    let dj = c.dense_grad(p, dim);
                    for (t, &d) in dj.iter().enumerate() {
                        if d == 0.0 {
                            continue;
                        }
                        for i in 0..n {
                            out_grad[i * dim + t] += local[i * np + j] * d;
                        }
                    }
                }
                Ok(())
            }
            Self::Mixture { components, .. } => {
                let (w, dw) = self.weights_grad(p, dim)?;
                let want_grad = out_grad.is_some();
                let k = components.len();
                let mut lp = vec![vec![0.0; n]; k];
                let mut gr = vec![Vec::new(); k];
                for (j, comp) in components.iter().enumerate() {
                    if want_grad {
                        gr[j] = vec![0.0; n * dim];
                        comp.eval(atoms, bounds, p, dim, &mut lp[j], Some(gr[j].as_mut_slice()))?;
                    } else {
                        comp.eval(atoms, bounds, p, dim, &mut lp[j], None)?;
                    }
                }

                let mut out_grad = out_grad;
                let mut e = vec![0.0; k];
                for i in 0..n {
                    // NaN marks a negative density somewhere below this node.
                    let negative = (0..k).any(|j| lp[j][i].is_nan());
                    let m = (0..k).map(|j| lp[j][i]).fold(f64::NEG_INFINITY, f64::max);
                    let mut s = 0.0;
                    if m.is_finite() && !negative {
                        for j in 0..k {
                            e[j] = (lp[j][i] - m).exp();
                            s += w[j] * e[j];
                        }
                    }
                    if negative || s < 0.0 {
                        out_logp[i] = f64::NAN;
                        if let Some(g) = out_grad.as_deref_mut() {
                            g[i * dim..(i + 1) * dim].fill(0.0);
                        }
                        continue;
                    }
                    if !(s > 0.0) {
                        out_logp[i] = f64::NEG_INFINITY;
                        if let Some(g) = out_grad.as_deref_mut() {
                            g[i * dim..(i + 1) * dim].fill(0.0);
                        }
                        continue;
                    }
                    out_logp[i] = m + s.ln();
                    if let Some(g) = out_grad.as_deref_mut() {
                        for t in 0..dim {
                            let mut acc = 0.0;
                            for j in 0..k {
                                acc += dw[j * dim + t] * e[j] + w[j] * e[j] * gr[j][i * dim + t];
                            }
                            g[i * dim + t] = acc / s;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Draw one observable value.
    pub(crate) fn sample(
        &self,
        bounds: (f64, f64),
        p: &[f64],
        rng: &mut dyn rand::RngCore,
    ) -> Result<f64> {
        match self {
            Self::Leaf { pdf, params, .. } => {
                let vals: Vec<f64> = params.iter().map(|c| c.value(p)).collect();
                pdf.sample(bounds, &vals, rng)
            }
            Self::Mixture { components, .. } => {
                let (w, _) = self.weights_grad(p, p.len())?;
                if w.iter().any(|&wj| wj < 0.0) {
                    return Err(Error::Computation(format!(
                        "pdf '{}': cannot sample with negative component weights {w:?}",
                        self.name()
                    )));
                }
                let u: f64 = rand::Rng::random(rng);
                let mut acc = 0.0;
                let mut pick = components.len() - 1;
                for (j, wj) in w.iter().enumerate() {
                    acc += wj;
                    if u < acc {
                        pick = j;
                        break;
                    }
                }
                components[pick].sample(bounds, p, rng)
            }
        }
    }

    /// Find a component by name, returning its overall weight in this tree.
    fn find(&self, target: &str, p: &[f64]) -> Result<Option<(f64, &Shape)>> {
        if self.name() == target {
            return Ok(Some((1.0, self)));
        }
        if let Self::Mixture { components, .. } = self {
            let (w, _) = self.weights_grad(p, p.len())?;
            for (j, comp) in components.iter().enumerate() {
                if let Some((wj, s)) = comp.find(target, p)? {
                    return Ok(Some((w[j] * wj, s)));
                }
            }
        }
        Ok(None)
    }

    fn component_names(&self) -> Vec<String> {
        match self {
            Self::Leaf { .. } => Vec::new(),
            Self::Mixture { components, .. } => {
                components.iter().map(|c| c.name().to_string()).collect()
            }
        }
    }
}

/// Resolves workspace nodes into a [`Shape`] tree.
struct Compiler<'a> {
    ws: &'a Workspace,
    index: BTreeMap<String, usize>,
}

impl Compiler<'_> {
    fn collect_value(ws: &Workspace, name: &str, out: &mut Vec<String>) -> Result<()> {
        if ws.has_var(name) {
            if !ws.var(name)?.constant && !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
            return Ok(());
        }
        match ws.func(name)? {
            FuncNode::Product { factors } => {
                for f in factors {
                    Self::collect_value(ws, f, out)?;
                }
                Ok(())
            }
            FuncNode::HistFunc { .. } => Err(Error::Validation(format!(
                "histogram function '{name}' cannot be used as a coefficient"
            ))),
        }
    }

    fn set_observable(observable: &mut Option<String>, x: &str) -> Result<()> {
        match observable {
            Some(o) if o != x => Err(Error::Validation(format!(
                "pdf mixes observables '{o}' and '{x}'"
            ))),
            Some(_) => Ok(()),
            None => {
                *observable = Some(x.to_string());
                Ok(())
            }
        }
    }

    fn collect_pdf(
        ws: &Workspace,
        name: &str,
        vars: &mut Vec<String>,
        observable: &mut Option<String>,
    ) -> Result<()> {
        match ws.pdf(name)? {
            PdfNode::Gaussian { x, mean, sigma } => {
                Self::set_observable(observable, x)?;
                Self::collect_value(ws, mean, vars)?;
                Self::collect_value(ws, sigma, vars)
            }
            PdfNode::Exponential { x, c } => {
                Self::set_observable(observable, x)?;
                Self::collect_value(ws, c, vars)
            }
            PdfNode::HistPdf { x, .. } => Self::set_observable(observable, x),
            PdfNode::Add { pdfs, coefs } => {
                // Term by term: `coef_j * pdf_j`, then the remainder pdf of a fraction sum.
                for (j, p) in pdfs.iter().enumerate() {
                    if let Some(c) = coefs.get(j) {
                        Self::collect_value(ws, c, vars)?;
                    }
                    Self::collect_pdf(ws, p, vars, observable)?;
                }
                Ok(())
            }
            PdfNode::RealSum { funcs, coefs } => {
                for (f, c) in funcs.iter().zip(coefs) {
                    Self::collect_value(ws, c, vars)?;
                    match ws.func(f)? {
                        FuncNode::HistFunc { x, .. } => Self::set_observable(observable, x)?,
                        FuncNode::Product { .. } => {
                            return Err(Error::Validation(format!(
                                "RealSum component '{f}' must be a histogram function"
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn coef(&self, name: &str) -> Result<Coef> {
        if self.ws.has_var(name) {
            let v = self.ws.var(name)?;
            if v.constant {
                return Ok(Coef::Const(v.value));
            }
            let idx = self
                .index
                .get(name)
                .ok_or_else(|| Error::Computation(format!("unindexed parameter '{name}'")))?;
            return Ok(Coef::Param(*idx));
        }
        match self.ws.func(name)? {
            FuncNode::Product { factors } => {
                Ok(Coef::Product(factors.iter().map(|f| self.coef(f)).collect::<Result<_>>()?))
            }
            FuncNode::HistFunc { .. } => Err(Error::Validation(format!(
                "histogram function '{name}' cannot be used as a coefficient"
            ))),
        }
    }

    fn template(&self, data: &str) -> Result<&BinnedData> {
        match self.ws.data(data)? {
            Dataset::Binned(h) => Ok(h),
            Dataset::Unbinned(_) => {
                Err(Error::Validation(format!("template dataset '{data}' is not binned")))
            }
        }
    }

    fn shape(&self, name: &str) -> Result<Shape> {
        let leaf = |pdf: Arc<dyn ShapePdf>, params: Vec<Coef>| Shape::Leaf {
            name: name.to_string(),
            pdf,
            params,
        };
        Ok(match self.ws.pdf(name)? {
            PdfNode::Gaussian { mean, sigma, .. } => {
                leaf(Arc::new(GaussianPdf::new()), vec![self.coef(mean)?, self.coef(sigma)?])
            }
            PdfNode::Exponential { c, .. } => {
                leaf(Arc::new(ExponentialPdf::new()), vec![self.coef(c)?])
            }
            PdfNode::HistPdf { data, .. } => {
                leaf(Arc::new(HistogramPdf::from_binned(self.template(data)?)?), Vec::new())
            }
            PdfNode::Add { pdfs, coefs } => Shape::Mixture {
                name: name.to_string(),
                components: pdfs.iter().map(|p| self.shape(p)).collect::<Result<_>>()?,
                coefs: coefs.iter().map(|c| self.coef(c)).collect::<Result<_>>()?,
                yields: coefs.len() == pdfs.len(),
            },
            PdfNode::RealSum { funcs, coefs } => {
                let mut components = Vec::with_capacity(funcs.len());
                let mut yields = Vec::with_capacity(funcs.len());
                for (f, c) in funcs.iter().zip(coefs) {
                    let FuncNode::HistFunc { data, .. } = self.ws.func(f)? else {
                        return Err(Error::Validation(format!(
                            "RealSum component '{f}' must be a histogram function"
                        )));
                    };
                    let hist = self.template(data)?;
                    // Expected events of a term: coefficient × ∫ histogram.
                    yields.push(Coef::Product(vec![self.coef(c)?, Coef::Const(hist.integral())]));
                    components.push(Shape::Leaf {
                        name: f.clone(),
                        pdf: Arc::new(HistogramPdf::from_binned(hist)?),
                        params: Vec::new(),
                    });
                }
                Shape::Mixture { name: name.to_string(), components, coefs: yields, yields: true }
            }
        })
    }
}

/// A PDF compiled against a workspace, optionally bound to a dataset.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    pdf_name: String,
    observable: RealVar,
    root: Shape,
    extended: bool,
    params: Vec<Parameter>,
    poi: Option<usize>,
    data: Option<Arc<Dataset>>,
}

impl CompiledModel {
    /// Compile the PDF `pdf` of `ws`.
    pub fn from_workspace(ws: &Workspace, pdf: &str) -> Result<Self> {
        let mut names = Vec::new();
        let mut observable = None;
        Compiler::collect_pdf(ws, pdf, &mut names, &mut observable)?;
        let observable = observable
            .ok_or_else(|| Error::Validation(format!("pdf '{pdf}' has no observable")))?;
        names.retain(|n| *n != observable);

        let mut params = Vec::with_capacity(names.len());
        let mut index = BTreeMap::new();
        for (i, n) in names.iter().enumerate() {
            let v = ws.var(n)?;
            params.push(Parameter { name: n.clone(), init: v.value, bounds: (v.min, v.max) });
            index.insert(n.clone(), i);
        }

        let root = Compiler { ws, index }.shape(pdf)?;
        let extended = matches!(root, Shape::Mixture { yields: true, .. });
        Ok(Self {
            pdf_name: pdf.to_string(),
            observable: ws.var(&observable)?.clone(),
            root,
            extended,
            params,
            poi: None,
            data: None,
        })
    }

    /// Compile the PDF named by a model config, with its first POI selected.
    pub fn from_model_config(ws: &Workspace, mc: &crate::ModelConfig) -> Result<Self> {
        let model = Self::from_workspace(ws, &mc.pdf)?;
        match mc.poi() {
            Some(poi) => model.with_poi(poi),
            None => Ok(model),
        }
    }

    /// Name of the compiled PDF.
    pub fn pdf_name(&self) -> &str {
        &self.pdf_name
    }

    /// Observable variable.
    pub fn observable(&self) -> &RealVar {
        &self.observable
    }

    /// True if the PDF predicts an event count.
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Floating parameters.
    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    /// Index of a parameter by name.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Names of the top-level components (empty for a plain shape).
    pub fn components(&self) -> Vec<String> {
        self.root.component_names()
    }

    /// Bound dataset.
    pub fn data(&self) -> Option<&Dataset> {
        self.data.as_deref()
    }

    /// Copy bound to `data`.
    pub fn with_data(&self, data: Dataset) -> Result<Self> {
        if data.observable() != self.observable.name {
            return Err(Error::Validation(format!(
                "dataset observable '{}' does not match model observable '{}'",
                data.observable(),
                self.observable.name
            )));
        }
        let mut out = self.clone();
        out.data = Some(Arc::new(data));
        Ok(out)
    }

    /// Copy with the POI set to `name`.
    pub fn with_poi(&self, name: &str) -> Result<Self> {
        let idx = self.parameter_index(name).ok_or_else(|| {
            Error::NotFound(format!(
                "POI '{name}' is not a floating parameter of '{}'",
                self.pdf_name
            ))
        })?;
        let mut out = self.clone();
        out.poi = Some(idx);
        Ok(out)
    }

    /// Copy with starting values overridden (clamped into bounds); unknown names are ignored.
    pub fn with_values(&self, values: &BTreeMap<String, f64>) -> Self {
        let mut out = self.clone();
        for p in &mut out.params {
            if let Some(v) = values.get(&p.name) {
                p.init = v.clamp(p.bounds.0, p.bounds.1);
            }
        }
        out
    }

    /// Copy with the full starting point replaced.
    pub fn with_init(&self, init: &[f64]) -> Result<Self> {
        if init.len() != self.params.len() {
            return Err(Error::Validation(format!(
                "expected {} initial values, got {}",
                self.params.len(),
                init.len()
            )));
        }
        let mut out = self.clone();
        for (p, &v) in out.params.iter_mut().zip(init) {
            p.init = v.clamp(p.bounds.0, p.bounds.1);
        }
        Ok(out)
    }

    fn check_params(&self, p: &[f64]) -> Result<()> {
        if p.len() != self.params.len() {
            return Err(Error::Validation(format!(
                "model '{}' expects {} parameters, got {}",
                self.pdf_name,
                self.params.len(),
                p.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn root(&self) -> &Shape {
        &self.root
    }

    /// Expected number of events for an extended model.
    pub fn expected_events(&self, p: &[f64]) -> Result<Option<f64>> {
        self.check_params(p)?;
        if !self.extended {
            return Ok(None);
        }
        Ok(Some(self.root.total_yield(p, p.len())?.0))
    }

    /// Normalized density of the full model at `xs`.
    pub fn density(&self, xs: &[f64], p: &[f64]) -> Result<Vec<f64>> {
        self.check_params(p)?;
        let mut lp = vec![0.0; xs.len()];
        self.root.eval(Atoms::Events(xs), self.observable.bounds(), p, p.len(), &mut lp, None)?;
        Ok(lp.into_iter().map(f64::exp).collect())
    }

    /// Density of component `name` scaled by its weight in the model.
    pub fn component_density(&self, name: &str, xs: &[f64], p: &[f64]) -> Result<Vec<f64>> {
        self.check_params(p)?;
        let (w, shape) = self.root.find(name, p)?.ok_or_else(|| {
            Error::NotFound(format!("component '{name}' in pdf '{}'", self.pdf_name))
        })?;
        let mut lp = vec![0.0; xs.len()];
        shape.eval(Atoms::Events(xs), self.observable.bounds(), p, p.len(), &mut lp, None)?;
        Ok(lp.into_iter().map(|l| w * l.exp()).collect())
    }

    /// Probability mass per bin for the given edges.
    pub fn bin_probabilities(&self, edges: &[f64], p: &[f64]) -> Result<Vec<f64>> {
        self.check_params(p)?;
        let mut lp = vec![0.0; edges.len().saturating_sub(1)];
        self.root.eval(Atoms::Bins(edges), self.observable.bounds(), p, p.len(), &mut lp, None)?;
        Ok(lp.into_iter().map(f64::exp).collect())
    }

    /// NLL and optional gradient; `+∞` (with a zero gradient) outside the physical region.
    ///
    /// Unbinned: `-Σ w_i log p(x_i)`; binned: `-Σ n_i log P_i`. Extended models add
    /// `ν - N log ν`, which for binned data reproduces the Poisson likelihood up to a
    /// constant.
    fn eval_nll(&self, p: &[f64], want_grad: bool) -> Result<(f64, Vec<f64>)> {
        self.check_params(p)?;
        let data = self.data.as_deref().ok_or_else(|| {
            Error::Validation(format!("model '{}' has no dataset bound", self.pdf_name))
        })?;
        let dim = p.len();
        if !self.root.feasible(p) {
            return Ok((f64::INFINITY, vec![0.0; dim]));
        }

        let edges: Vec<f64>;
        let ones: Vec<f64>;
        let (atoms, weights): (Atoms<'_>, &[f64]) = match data {
            Dataset::Unbinned(ev) => {
                let w = match ev.weights() {
                    Some(w) => w,
                    None => {
                        ones = vec![1.0; ev.n_events()];
                        &ones
                    }
                };
                (Atoms::Events(ev.values()), w)
            }
            Dataset::Binned(h) => {
                edges = h.binning().edges();
                (Atoms::Bins(&edges), h.counts())
            }
        };

        let n = atoms.len();
        let mut logp = vec![0.0; n];
        let mut grad = if want_grad { Some(vec![0.0; n * dim]) } else { None };
        self.root.eval(atoms, self.observable.bounds(), p, dim, &mut logp, grad.as_deref_mut())?;

        let mut nll = 0.0;
        let mut g = vec![0.0; dim];
        let mut sum_w = 0.0;
        for i in 0..n {
            let w = weights[i];
            if w == 0.0 {
                continue;
            }
            sum_w += w;
            let lp = logp[i];
            if lp.is_nan() {
                return Ok((f64::INFINITY, vec![0.0; dim]));
            }
            if lp.is_finite() {
                nll -= w * lp;
                if let Some(gr) = &grad {
                    for t in 0..dim {
                        g[t] -= w * gr[i * dim + t];
                    }
                }
            } else {
                nll -= w * LOG_FLOOR;
            }
        }

        if self.extended {
            let (nu, dnu) = self.root.total_yield(p, dim)?;
            nll += nu - sum_w * nu.ln();
            let scale = 1.0 - sum_w / nu;
            for t in 0..dim {
                g[t] += dnu[t] * scale;
            }
        }

        if !nll.is_finite() {
            return Err(Error::Computation(format!(
                "non-finite NLL for '{}' at {p:?}",
                self.pdf_name
            )));
        }
        Ok((nll, g))
    }
}

impl LogDensityModel for CompiledModel {
    type Prepared<'a>
        = PreparedModelRef<'a, Self>
    where
        Self: 'a;

    fn dim(&self) -> usize {
        self.params.len()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        self.params.iter().map(|p| p.bounds).collect()
    }

    fn parameter_init(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.init).collect()
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        Ok(self.eval_nll(params, false)?.0)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        Ok(self.eval_nll(params, true)?.1)
    }

    fn prepared(&self) -> Self::Prepared<'_> {
        PreparedModelRef::new(self)
    }

    fn nll_grad_prepared(
        &self,
        _prepared: &Self::Prepared<'_>,
        params: &[f64],
    ) -> Result<(f64, Vec<f64>)> {
        self.eval_nll(params, true)
    }
}

impl PoiModel for CompiledModel {
    fn poi_index(&self) -> Option<usize> {
        self.poi
    }
}

impl FixedParamModel for CompiledModel {
    fn with_fixed_param(&self, param_idx: usize, value: f64) -> Self {
        let mut out = self.clone();
        if let Some(p) = out.params.get_mut(param_idx) {
            let v = value.clamp(p.bounds.0, p.bounds.1);
            p.init = v;
            p.bounds = (v, v);
        }
        out
    }
}
