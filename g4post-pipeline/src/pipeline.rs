//! Ordered execution of resolved modules on one processing context.

use crate::descriptor::ModuleDescriptor;
use crate::error::{Error, Result};
use crate::module::{Acceptance, Module, ModuleKind};
use crate::resources::Resources;
use g4post_core::ProcessingContext;
use std::collections::HashSet;

/// An ordered list of modules.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    modules: Vec<Module>,
}

impl Pipeline {
    #[must_use]
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// Resolves and validates every descriptor, stopping at the first error.
    ///
    /// # Errors
    /// Returns the configuration error of the first invalid descriptor.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = ModuleDescriptor>,
    {
        descriptors
            .into_iter()
            .map(Module::from_descriptor)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Checks that every variable a module reads is either in `initial` or
    /// written by an earlier module.
    ///
    /// # Errors
    /// Returns [`Error::UndefinedVariable`] for the first unresolved read.
    pub fn check_variables<'a, I>(&self, initial: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut available: HashSet<&str> = initial.into_iter().collect();
        for module in &self.modules {
            if let Some(variable) = module.reads().find(|v| !available.contains(v)) {
                return Err(Error::UndefinedVariable {
                    module: module.name().to_string(),
                    variable: variable.to_string(),
                });
            }
            available.extend(module.writes());
        }
        Ok(())
    }

    /// Checks that every final output name is produced by the input mapping
    /// or some module.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first missing output.
    pub fn check_outputs<'a, I, O>(&self, initial: I, outputs: O) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
        O: IntoIterator<Item = &'a str>,
    {
        let mut produced: HashSet<&str> = initial.into_iter().collect();
        produced.extend(self.modules.iter().flat_map(Module::writes));
        match outputs.into_iter().find(|name| !produced.contains(name)) {
            Some(name) => Err(Error::Config(format!(
                "output variable `{name}` is never produced"
            ))),
            None => Ok(()),
        }
    }

    /// True when some module needs the run registry.
    #[must_use]
    pub fn requires_registry(&self) -> bool {
        self.modules
            .iter()
            .any(|m| matches!(m.kind(), ModuleKind::DetectorActiveTime))
    }

    /// Verifies that `resources` can serve every module, loading geometry
    /// tables into the cache.
    ///
    /// # Errors
    /// Returns [`Error::MissingRegistry`] or a resource error.
    pub fn prepare(&self, resources: &Resources) -> Result<()> {
        for module in &self.modules {
            match module.kind() {
                ModuleKind::DetectorActiveTime if resources.registry().is_none() => {
                    return Err(Error::MissingRegistry {
                        module: module.name().to_string(),
                    });
                }
                ModuleKind::ActiveVolume(Acceptance::Polycone { file, surface }) => {
                    resources.geometry(file, surface)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Runs every module in order on `ctx`.
    ///
    /// # Errors
    /// Stops at the first failing module and returns its error.
    pub fn run(&self, ctx: &mut ProcessingContext, resources: &Resources) -> Result<()> {
        for module in &self.modules {
            module.run(ctx, resources)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn steps() -> Vec<ModuleDescriptor> {
        vec![
            ModuleDescriptor::new("windowing", "window")
                .with_para(json!({"dT": 5.0}))
                .with_input("t", "t")
                .with_input("t_all", "t")
                .with_input("edep", "edep")
                .with_output("w_t", "w_t")
                .with_output("t_sub", "t_sub")
                .with_output("edep", "edep_w"),
            ModuleDescriptor::new("energy", "sum")
                .with_input("val", "edep_w")
                .with_output("val", "e_sum"),
        ]
    }

    #[test]
    fn test_variable_flow() {
        let pipeline = Pipeline::from_descriptors(steps()).unwrap();
        assert_eq!(pipeline.len(), 2);
        pipeline.check_variables(["t", "edep"]).unwrap();
        pipeline
            .check_outputs(["t", "edep"], ["w_t", "e_sum", "t"])
            .unwrap();

        let err = pipeline.check_variables(["t"]).unwrap_err();
        assert!(matches!(
            err,
            Error::UndefinedVariable { ref module, ref variable } if module == "windowing" && variable == "edep"
        ));
        assert!(pipeline.check_outputs(["t", "edep"], ["r90"]).is_err());
    }

    #[test]
    fn test_reads_see_only_earlier_outputs() {
        let mut reversed = steps();
        reversed.reverse();
        let pipeline = Pipeline::from_descriptors(reversed).unwrap();
        assert!(matches!(
            pipeline.check_variables(["t", "edep"]),
            Err(Error::UndefinedVariable { ref variable, .. }) if variable == "edep_w"
        ));
    }

    #[test]
    fn test_registry_requirement() {
        let pipeline = Pipeline::from_descriptors(steps()).unwrap();
        assert!(!pipeline.requires_registry());
        pipeline.prepare(&Resources::new()).unwrap();

        let livetime = ModuleDescriptor::new("livetime", "detector_active_time")
            .with_input("edep", "edep")
            .with_input("vol", "vol")
            .with_output("edep", "edep");
        let pipeline = Pipeline::from_descriptors([livetime]).unwrap();
        assert!(pipeline.requires_registry());
        assert!(matches!(
            pipeline.prepare(&Resources::new()),
            Err(Error::MissingRegistry { .. })
        ));
    }
}
