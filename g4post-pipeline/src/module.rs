//! The closed set of module kinds, their load-time validation and execution.

use crate::descriptor::ModuleDescriptor;
use crate::error::{Error, Result};
use crate::params::{
    AcceptancePara, ActiveVolumePara, CoincidencePara, GroupPara, WindowPara,
};
use crate::resources::Resources;
use g4post_algorithms::{
    acceptance_range, coincidences, cylinder_mask, first_per_group, group_by_id, group_mask,
    mask_inactive, max, polycone_mask, r90, sum, ActiveMask, Cylinder, Gate, Windows,
};
use g4post_core::{map_column, Column, ProcessingContext, Ragged};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Acceptance region of an `active_volume` module.
#[derive(Clone, Debug, PartialEq)]
pub enum Acceptance {
    Cylinder(Cylinder),
    /// Per-volume boundaries read from a geometry table.
    Polycone { file: PathBuf, surface: String },
}

/// A module kind together with its validated parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum ModuleKind {
    Window { dt: f64 },
    /// `members` is `Some` in selection mode.
    GroupSensitiveVolume { members: Option<Vec<i64>> },
    ActiveVolume(Acceptance),
    Sum,
    Max,
    R90Estimator,
    CoincidenceWindow(Gate),
    AcceptanceRange { low: f64, high: f64 },
    Mask,
    DetectorActiveTime,
}

impl ModuleKind {
    /// Every kind name accepted in the `module` field.
    pub const NAMES: [&'static str; 10] = [
        "window",
        "group_sensitive_volume",
        "active_volume",
        "sum",
        "max",
        "r90_estimator",
        "coincidence_window",
        "acceptance_range",
        "mask",
        "detector_active_time",
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Window { .. } => "window",
            Self::GroupSensitiveVolume { .. } => "group_sensitive_volume",
            Self::ActiveVolume(_) => "active_volume",
            Self::Sum => "sum",
            Self::Max => "max",
            Self::R90Estimator => "r90_estimator",
            Self::CoincidenceWindow(_) => "coincidence_window",
            Self::AcceptanceRange { .. } => "acceptance_range",
            Self::Mask => "mask",
            Self::DetectorActiveTime => "detector_active_time",
        }
    }
}

/// A resolved pipeline step.
#[derive(Clone, Debug)]
pub struct Module {
    descriptor: ModuleDescriptor,
    kind: ModuleKind,
}

impl Module {
    /// Resolves the descriptor's kind and validates its keys and parameters.
    ///
    /// # Errors
    /// Returns a configuration error naming the module and the offending key.
    pub fn from_descriptor(descriptor: ModuleDescriptor) -> Result<Self> {
        let d = &descriptor;
        let kind = match d.module.as_str() {
            "window" => build_window(d)?,
            "group_sensitive_volume" => build_group(d)?,
            "active_volume" => build_active_volume(d)?,
            "sum" => {
                value_to_value(d)?;
                ModuleKind::Sum
            }
            "max" => {
                value_to_value(d)?;
                ModuleKind::Max
            }
            "r90_estimator" => {
                require_inputs(d, &["edep", "posx", "posy", "posz"])?;
                require_outputs(d, &["r90"])?;
                ModuleKind::R90Estimator
            }
            "coincidence_window" => build_coincidence(d)?,
            "acceptance_range" => {
                value_to_value(d)?;
                let para: AcceptancePara = d.params()?;
                ModuleKind::AcceptanceRange {
                    low: para.thr[0],
                    high: para.thr[1],
                }
            }
            "mask" => {
                require_inputs(d, &["mask"])?;
                payloads_have_outputs(d, &["mask"])?;
                ModuleKind::Mask
            }
            "detector_active_time" => {
                require_inputs(d, &["edep", "vol"])?;
                require_outputs(d, &["edep"])?;
                ModuleKind::DetectorActiveTime
            }
            other => {
                return Err(Error::UnknownModule {
                    module: d.name.clone(),
                    kind: other.to_string(),
                })
            }
        };
        Ok(Self { descriptor, kind })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn kind(&self) -> &ModuleKind {
        &self.kind
    }

    #[must_use]
    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// Context variables this module reads.
    pub fn reads(&self) -> impl Iterator<Item = &str> {
        self.descriptor.input.values().map(String::as_str)
    }

    /// Context variables this module writes.
    pub fn writes(&self) -> impl Iterator<Item = &str> {
        self.descriptor.output.values().map(String::as_str)
    }

    /// Runs the module on `ctx`, writing its outputs once all are computed.
    ///
    /// # Errors
    /// Returns an error when an input variable is missing, a resource cannot
    /// be loaded, or the data is misaligned.
    pub fn run(&self, ctx: &mut ProcessingContext, resources: &Resources) -> Result<()> {
        log::debug!("running module `{}` ({})", self.name(), self.kind.name());
        let results = self.compute(ctx, resources)?;
        for (variable, column) in results {
            ctx.insert(variable, column);
        }
        Ok(())
    }

    fn compute(
        &self,
        ctx: &ProcessingContext,
        resources: &Resources,
    ) -> Result<Vec<(String, Column)>> {
        match &self.kind {
            ModuleKind::Window { dt } => self.run_window(ctx, *dt),
            ModuleKind::GroupSensitiveVolume { members } => self.run_group(ctx, members.as_deref()),
            ModuleKind::ActiveVolume(acceptance) => {
                self.run_active_volume(ctx, acceptance, resources)
            }
            ModuleKind::Sum => {
                let reduced = sum(self.column(ctx, "val")?).map_err(|e| self.fail(e))?;
                Ok(vec![(self.target("val")?, reduced)])
            }
            ModuleKind::Max => {
                let reduced = max(self.column(ctx, "val")?).map_err(|e| self.fail(e))?;
                Ok(vec![(self.target("val")?, reduced)])
            }
            ModuleKind::R90Estimator => {
                let edep = self.floats(ctx, "edep")?;
                let x = self.floats(ctx, "posx")?;
                let y = self.floats(ctx, "posy")?;
                let z = self.floats(ctx, "posz")?;
                let radius = r90(&edep, &x, &y, &z).map_err(|e| self.fail(e))?;
                Ok(vec![(self.target("r90")?, Column::Float(radius))])
            }
            ModuleKind::CoincidenceWindow(gate) => self.run_coincidence(ctx, *gate),
            ModuleKind::AcceptanceRange { low, high } => {
                let values = self.floats(ctx, "val")?;
                let accepted = acceptance_range(&values, *low, *high);
                Ok(vec![(self.target("val")?, Column::Bool(accepted))])
            }
            ModuleKind::Mask => {
                let mask = self
                    .column(ctx, "mask")?
                    .as_bool()
                    .map_err(|e| self.fail(e))?;
                self.payloads(&["mask"])
                    .map(|key| -> Result<(String, Column)> {
                        let masked = self.column(ctx, key)?.filter(mask).map_err(|e| self.fail(e))?;
                        Ok((self.target(key)?, masked))
                    })
                    .collect()
            }
            ModuleKind::DetectorActiveTime => {
                let registry = resources.registry().ok_or_else(|| Error::MissingRegistry {
                    module: self.name().to_string(),
                })?;
                let edep = self.floats(ctx, "edep")?;
                let vol = self.ints(ctx, "vol")?;
                let total_rows = ctx
                    .total_rows()
                    .unwrap_or_else(|| ctx.first_row() + edep.len());
                let masked = mask_inactive(&edep, &vol, ctx.first_row(), total_rows, registry)
                    .map_err(|e| self.fail(e))?;
                Ok(vec![(self.target("edep")?, Column::Float(masked))])
            }
        }
    }

    fn run_window(&self, ctx: &ProcessingContext, dt: f64) -> Result<Vec<(String, Column)>> {
        let t = self.floats(ctx, "t")?;
        let pool = self.floats(ctx, "t_all")?;
        let windows = Windows::assign(&t, &pool, dt).map_err(|e| self.fail(e))?;
        let t_sub = windows.grouped_t_sub().map_err(|e| self.fail(e))?;

        let mut results = vec![
            (self.target("w_t")?, Column::Float(windows.anchors.clone())),
            (self.target("t_sub")?, Column::Float(t_sub)),
        ];
        for key in self.payloads(&["t", "t_all"]) {
            let grouped = map_column!(self.column(ctx, key)?, |values| windows.group(values))
                .map_err(|e| self.fail(e))?;
            results.push((self.target(key)?, grouped));
        }
        Ok(results)
    }

    fn run_group(
        &self,
        ctx: &ProcessingContext,
        members: Option<&[i64]>,
    ) -> Result<Vec<(String, Column)>> {
        let vol = self.ints(ctx, "vol")?;
        let selection = members.map(|members| group_mask(&vol, members));
        self.payloads(&[])
            .map(|key| -> Result<(String, Column)> {
                let column = self.column(ctx, key)?;
                let grouped = match &selection {
                    Some(mask) => column.filter(mask),
                    None => map_column!(column, |values| group_by_id(&vol, values)),
                }
                .map_err(|e| self.fail(e))?;
                Ok((self.target(key)?, grouped))
            })
            .collect()
    }

    fn run_active_volume(
        &self,
        ctx: &ProcessingContext,
        acceptance: &Acceptance,
        resources: &Resources,
    ) -> Result<Vec<(String, Column)>> {
        let x = self.floats(ctx, "posx")?;
        let y = self.floats(ctx, "posy")?;
        let z = self.floats(ctx, "posz")?;
        let hits = match acceptance {
            Acceptance::Cylinder(cylinder) => cylinder_mask(&x, &y, &z, cylinder),
            Acceptance::Polycone { file, surface } => {
                let table = resources.geometry(file, surface)?;
                let vol = self.ints(ctx, "vol")?;
                polycone_mask(&x, &y, &z, &vol, &table)
            }
        }
        .map_err(|e| self.fail(e))?;
        let mask = ActiveMask::new(hits).map_err(|e| self.fail(e))?;

        let mut results = Vec::with_capacity(self.descriptor.output.len());
        for key in self.payloads(&[]) {
            let column = self.column(ctx, key)?;
            let per_group = mask.depth() >= 2 && column.depth() + 1 == mask.depth();
            let masked = if per_group {
                map_column!(column, |values| mask.apply_to_groups(values))
            } else {
                map_column!(column, |values| mask.apply(values))
            }
            .map_err(|e| self.fail(e))?;
            results.push((self.target(key)?, masked));
        }

        if let Some(target) = self.descriptor.output.get("vol_red") {
            let vol = mask.apply(&self.ints(ctx, "vol")?).map_err(|e| self.fail(e))?;
            let reduced = first_per_group(&vol).map_err(|e| self.fail(e))?;
            results.push((target.clone(), Column::Int(reduced)));
        }
        Ok(results)
    }

    fn run_coincidence(&self, ctx: &ProcessingContext, gate: Gate) -> Result<Vec<(String, Column)>> {
        let reference = self.floats(ctx, "w_t_1")?;
        let companion = self.floats(ctx, "w_t_2")?;
        self.payloads(&["w_t_1", "w_t_2"])
            .map(|key| -> Result<(String, Column)> {
                let gated = map_column!(self.column(ctx, key)?, |values| {
                    coincidences(&reference, &companion, values, gate)
                })
                .map_err(|e| self.fail(e))?;
                Ok((self.target(key)?, gated))
            })
            .collect()
    }

    /// Input role keys other than `skip`, in key order.
    fn payloads<'s>(&'s self, skip: &'s [&str]) -> impl Iterator<Item = &'s str> + 's {
        self.descriptor
            .input
            .keys()
            .map(String::as_str)
            .filter(move |key| !skip.contains(key))
    }

    fn column<'c>(&self, ctx: &'c ProcessingContext, key: &str) -> Result<&'c Column> {
        let variable = self.descriptor.required_input(key)?;
        ctx.get(variable).map_err(|e| self.fail(e))
    }

    fn floats(&self, ctx: &ProcessingContext, key: &str) -> Result<Ragged<f64>> {
        self.column(ctx, key)?.to_float().map_err(|e| self.fail(e))
    }

    fn ints(&self, ctx: &ProcessingContext, key: &str) -> Result<Ragged<i64>> {
        self.column(ctx, key)?.to_int().map_err(|e| self.fail(e))
    }

    fn target(&self, key: &str) -> Result<String> {
        Ok(self.descriptor.required_output(key)?.to_string())
    }

    fn fail(&self, source: g4post_core::Error) -> Error {
        Error::in_module(self.name(), source)
    }
}

fn require_inputs(d: &ModuleDescriptor, keys: &[&str]) -> Result<()> {
    keys.iter().try_for_each(|key| d.required_input(key).map(drop))
}

fn require_outputs(d: &ModuleDescriptor, keys: &[&str]) -> Result<()> {
    keys.iter().try_for_each(|key| d.required_output(key).map(drop))
}

/// Every input key outside `control` needs an output of the same key, and
/// no other outputs may be declared.
fn payloads_have_outputs(d: &ModuleDescriptor, control: &[&str]) -> Result<()> {
    for key in d.input.keys().filter(|key| !control.contains(&key.as_str())) {
        d.required_output(key)?;
    }
    let payloads = d.input.len() - control.iter().filter(|k| d.input.contains_key(**k)).count();
    if d.output.len() != payloads {
        return Err(Error::invalid(
            &d.name,
            format!(
                "expected one output per payload input ({payloads}), found {}",
                d.output.len()
            ),
        ));
    }
    Ok(())
}

fn value_to_value(d: &ModuleDescriptor) -> Result<()> {
    require_inputs(d, &["val"])?;
    require_outputs(d, &["val"])
}

fn build_window(d: &ModuleDescriptor) -> Result<ModuleKind> {
    require_inputs(d, &["t", "t_all"])?;
    require_outputs(d, &["w_t", "t_sub"])?;
    let para: WindowPara = d.params()?;
    if !(para.dt.is_finite() && para.dt > 0.0) {
        return Err(Error::invalid(&d.name, format!("dT must be positive, got {}", para.dt)));
    }
    if d.input.len() != d.output.len() {
        return Err(Error::invalid(
            &d.name,
            format!(
                "input and output counts differ ({} vs {})",
                d.input.len(),
                d.output.len()
            ),
        ));
    }
    for key in d.input.keys().filter(|k| *k != "t" && *k != "t_all") {
        d.required_output(key)?;
    }
    Ok(ModuleKind::Window { dt: para.dt })
}

fn build_group(d: &ModuleDescriptor) -> Result<ModuleKind> {
    require_inputs(d, &["vol"])?;
    payloads_have_outputs(d, &[])?;
    let para: GroupPara = d.params()?;
    let members = match para.group {
        None => None,
        Some(group) => {
            let table = para.sensitive_volumes.ok_or_else(|| Error::MissingKey {
                module: d.name.clone(),
                section: "para",
                key: "sensitive_volumes".to_string(),
            })?;
            Some(table.members(&group).ok_or_else(|| {
                Error::invalid(&d.name, "sensVolID and group lists differ in length")
            })?)
        }
    };
    Ok(ModuleKind::GroupSensitiveVolume { members })
}

fn build_active_volume(d: &ModuleDescriptor) -> Result<ModuleKind> {
    let para: ActiveVolumePara = d.params()?;
    let missing_para = |key: &str| Error::MissingKey {
        module: d.name.clone(),
        section: "para",
        key: key.to_string(),
    };
    let acceptance = match para.kind.as_str() {
        "cylinder" => {
            let c = para.conditions.ok_or_else(|| missing_para("conditions"))?;
            Acceptance::Cylinder(Cylinder {
                radius: c.r,
                h_top: c.h_top,
                h_bottom: c.h_bottom,
                inverse: para.inverse,
            })
        }
        "deadlayer" | "polycone" => Acceptance::Polycone {
            file: para.file.ok_or_else(|| missing_para("file"))?,
            surface: para.surface,
        },
        other => {
            return Err(Error::invalid(
                &d.name,
                format!("unknown active volume type `{other}`"),
            ))
        }
    };

    require_inputs(d, &["posx", "posy", "posz"])?;
    if matches!(acceptance, Acceptance::Polycone { .. }) {
        require_inputs(d, &["vol"])?;
    }
    for key in d.input.keys() {
        d.required_output(key)?;
    }
    let inputs: BTreeSet<&str> = d.input.keys().map(String::as_str).collect();
    for key in d.output.keys().filter(|k| !inputs.contains(k.as_str())) {
        let polycone = matches!(acceptance, Acceptance::Polycone { .. });
        if key != "vol_red" || !polycone {
            return Err(Error::invalid(
                &d.name,
                format!("output `{key}` has no matching input"),
            ));
        }
    }
    Ok(ModuleKind::ActiveVolume(acceptance))
}

fn build_coincidence(d: &ModuleDescriptor) -> Result<ModuleKind> {
    require_inputs(d, &["w_t_1", "w_t_2"])?;
    if d.input.len() <= 2 {
        return Err(Error::invalid(
            &d.name,
            "needs at least one payload input besides w_t_1 and w_t_2",
        ));
    }
    payloads_have_outputs(d, &["w_t_1", "w_t_2"])?;
    let para: CoincidencePara = d.params()?;
    let [t_min, t_max] = para.coincidence_gate;
    Ok(ModuleKind::CoincidenceWindow(Gate::new(t_min, t_max)))
}
