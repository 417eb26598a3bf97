//! Side-effect free activation planning

use super::layer::LayerError;
use super::verify::{DependencyError, InterfaceIndex};
use crate::service::ServiceDescriptor;
use indexmap::IndexSet;

/// A service in the activation plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub service: String,
    pub interfaces: Vec<String>,
    /// `(binding, interface, provider)` triples
    pub dependencies: Vec<(String, String, String)>,
    /// Reference count the service will hold once started
    pub ref_count: usize,
    /// Whether the layer itself holds this service
    pub root: bool,
}

/// Construction and teardown order the layer will follow
#[derive(Debug, Clone)]
pub struct ActivationPlan {
    /// Services in construction order
    pub steps: Vec<PlanStep>,
    /// Service ids in teardown order
    pub teardown: Vec<String>,
}

impl ActivationPlan {
    /// Walk the verified graph depth-first without constructing anything.
    ///
    /// Fails with [`LayerError::Cycle`] when a service transitively depends on itself.
    pub fn build(
        services: &[ServiceDescriptor],
        index: &InterfaceIndex,
    ) -> Result<Self, LayerError> {
        let dependents = index.dependent_counts(services);
        let targets = resolve_targets(services, index)?;

        let mut walk = Walk {
            targets: &targets,
            in_progress: IndexSet::new(),
            done: vec![false; services.len()],
            order: Vec::with_capacity(services.len()),
        };
        for idx in 0..services.len() {
            walk.visit(idx, services)?;
        }

        let steps = walk
            .order
            .iter()
            .map(|&idx| {
                let service = &services[idx];
                let root = dependents[idx] == 0;
                PlanStep {
                    service: service.id().to_string(),
                    interfaces: service.interfaces().to_vec(),
                    dependencies: service
                        .dependencies()
                        .iter()
                        .zip(&targets[idx])
                        .map(|(dependency, &target)| {
                            (
                                dependency.name.clone(),
                                dependency.interface.clone(),
                                services[target].id().to_string(),
                            )
                        })
                        .collect(),
                    ref_count: dependents[idx] + usize::from(root),
                    root,
                }
            })
            .collect();

        // Replay the release walk on plain counters
        let mut counts: Vec<usize> = dependents
            .iter()
            .map(|&count| count + usize::from(count == 0))
            .collect();
        let mut released = vec![false; services.len()];
        let mut teardown = Vec::with_capacity(services.len());
        for idx in (0..services.len()).filter(|&idx| dependents[idx] == 0) {
            release(idx, &targets, &mut counts, &mut released, &mut teardown);
        }

        Ok(Self {
            steps,
            teardown: teardown.into_iter().map(|idx| services[idx].id().to_string()).collect(),
        })
    }

    /// Service ids in construction order
    pub fn construction_order(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.service.as_str())
    }

    /// Service ids in teardown order
    pub fn teardown_order(&self) -> impl Iterator<Item = &str> {
        self.teardown.iter().map(String::as_str)
    }
}

/// Provider position of every declared dependency, per service
pub(crate) fn resolve_targets(
    services: &[ServiceDescriptor],
    index: &InterfaceIndex,
) -> Result<Vec<Vec<usize>>, DependencyError> {
    services
        .iter()
        .map(|service| {
            service
                .dependencies()
                .iter()
                .map(|dependency| {
                    index.get(&dependency.interface).ok_or_else(|| {
                        DependencyError::UnboundDependency {
                            service: service.id().to_string(),
                            binding: dependency.name.clone(),
                            interface: dependency.interface.clone(),
                        }
                    })
                })
                .collect()
        })
        .collect()
}

struct Walk<'a> {
    targets: &'a [Vec<usize>],
    in_progress: IndexSet<usize>,
    done: Vec<bool>,
    order: Vec<usize>,
}

impl Walk<'_> {
    fn visit(&mut self, idx: usize, services: &[ServiceDescriptor]) -> Result<(), LayerError> {
        if self.done[idx] {
            return Ok(());
        }
        if let Some(position) = self.in_progress.get_index_of(&idx) {
            let mut path: Vec<String> = self
                .in_progress
                .iter()
                .skip(position)
                .map(|&member| services[member].id().to_string())
                .collect();
            path.push(services[idx].id().to_string());
            return Err(LayerError::Cycle { path });
        }

        let targets = self.targets;
        self.in_progress.insert(idx);
        for &target in &targets[idx] {
            self.visit(target, services)?;
        }
        self.in_progress.pop();

        self.done[idx] = true;
        self.order.push(idx);
        Ok(())
    }
}

fn release(
    idx: usize,
    targets: &[Vec<usize>],
    counts: &mut [usize],
    released: &mut [bool],
    teardown: &mut Vec<usize>,
) {
    if released[idx] {
        return;
    }
    counts[idx] = counts[idx].saturating_sub(1);
    if counts[idx] > 0 {
        return;
    }

    released[idx] = true;
    teardown.push(idx);
    for &target in &targets[idx] {
        release(target, targets, counts, released, teardown);
    }
}

/// Display the activation plan in a human-readable format
impl std::fmt::Display for ActivationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Activation Plan")?;
        writeln!(f, "===============")?;
        writeln!(f)?;

        writeln!(f, "Services (in construction order):")?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f)?;
            writeln!(
                f,
                "  {}. {}{}",
                i + 1,
                step.service,
                if step.root { " [root]" } else { "" }
            )?;

            if !step.interfaces.is_empty() {
                writeln!(f, "     Provides: {}", step.interfaces.join(", "))?;
            }

            for (binding, interface, provider) in &step.dependencies {
                writeln!(f, "     References: {} = {} ({})", binding, interface, provider)?;
            }

            writeln!(f, "     Reference count: {}", step.ref_count)?;
        }

        writeln!(f)?;
        writeln!(f, "Teardown order: {}", self.teardown.join(", "))?;

        Ok(())
    }
}
