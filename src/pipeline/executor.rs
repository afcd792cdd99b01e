//! Matrix and frame execution.

use std::path::Path;
use std::sync::Arc;

use super::options::ExecutionContext;
use super::outputs::{emit_outputs, OutputEmissionError, PipelineOutputArtifact};
use super::planner::MatrixPlannerResult;
use super::provider::PlannerProvider;
use super::{PipelineError, PipelineStage};
use crate::data::Dataset;
use crate::dax::DaxQueryPlan;
use crate::model::{FrameChild, FrameVisual, MatrixVisual, Visual, FRAME};
use crate::render::{Figure, Renderer, TableRenderer};

/// Everything produced by executing one visual.
#[derive(Debug)]
pub struct VisualExecutionResult {
    pub visual: Visual,
    pub case_key: Option<String>,
    pub figure: Figure,
    /// One plan for a matrix; empty for a frame.
    pub plans: Vec<DaxQueryPlan>,
    /// The matrix dataset, or each frame child's dataset in order.
    pub datasets: Vec<Dataset>,
    pub outputs: Vec<PipelineOutputArtifact>,
    pub output_failures: Vec<OutputEmissionError>,
    /// Per-child results of a frame, in declared order.
    pub children: Vec<VisualExecutionResult>,
}

impl VisualExecutionResult {
    pub fn has_output_failures(&self) -> bool {
        !self.output_failures.is_empty()
    }
}

/// Executes visuals through their registered planners.
#[derive(Clone)]
pub struct Pipeline {
    planners: PlannerProvider,
    renderer: Arc<dyn Renderer>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("planners", &self.planners)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(planners: PlannerProvider, renderer: Arc<dyn Renderer>) -> Self {
        Self { planners, renderer }
    }

    /// Pipeline rendering through the default table renderer.
    pub fn with_planners(planners: PlannerProvider) -> Self {
        Self::new(planners, Arc::new(TableRenderer::new()))
    }

    pub fn planners(&self) -> &PlannerProvider {
        &self.planners
    }

    /// Execute `visual`, recursing into frame children.
    pub fn execute(
        &self,
        visual: &Visual,
        context: &ExecutionContext,
    ) -> Result<VisualExecutionResult, PipelineError> {
        let result = match visual {
            Visual::Matrix(matrix) => self.execute_matrix(matrix, context),
            Visual::Frame(frame) => self.execute_frame(frame, context),
        };

        if let Err(err) = &result {
            tracing::warn!(
                visual_type = visual.visual_type(),
                case_key = context.case_key.as_deref(),
                stage = %err.stage(),
                error = %err,
                "visual execution failed"
            );
        }
        result
    }

    fn execute_matrix(
        &self,
        matrix: &Arc<MatrixVisual>,
        context: &ExecutionContext,
    ) -> Result<VisualExecutionResult, PipelineError> {
        let case_key = context.case_key.as_deref();
        let visual = Visual::Matrix(Arc::clone(matrix));

        log_stage(PipelineStage::PlannerResolution, &visual, case_key);
        let planner = self.planners.resolve(visual.visual_type())?;

        log_stage(PipelineStage::QueryPlanning, &visual, case_key);
        let MatrixPlannerResult { plan, mut dataset } = planner.plan(matrix, context)?;
        tracing::debug!(
            case_key,
            rows = dataset.len(),
            "dataset acquired"
        );

        log_stage(PipelineStage::InvariantChecking, &visual, case_key);
        check_invariants(matrix, &plan, &mut dataset, context)?;

        log_stage(PipelineStage::Rendering, &visual, case_key);
        let figure = self.renderer.render_matrix(matrix, &dataset)?;

        log_stage(PipelineStage::OutputEmission, &visual, case_key);
        let options = &context.options;
        let report = emit_outputs(
            self.renderer.as_ref(),
            &figure,
            &options.outputs,
            options.png_scale,
        );

        Ok(VisualExecutionResult {
            visual,
            case_key: context.case_key.clone(),
            figure,
            plans: vec![plan],
            datasets: vec![dataset],
            outputs: report.artifacts,
            output_failures: report.failures,
            children: Vec::new(),
        })
    }

    fn execute_frame(
        &self,
        frame: &Arc<FrameVisual>,
        context: &ExecutionContext,
    ) -> Result<VisualExecutionResult, PipelineError> {
        let case_key = context.case_key.as_deref();
        let visual = Visual::Frame(Arc::clone(frame));
        let child_options = context.options.without_outputs();

        let mut children = Vec::with_capacity(frame.children().len());
        let mut pairs = Vec::with_capacity(frame.children().len());

        for (offset, child) in frame.children().iter().enumerate() {
            let index = offset + 1;
            let Visual::Matrix(matrix) = child.visual() else {
                return Err(PipelineError::UnsupportedChild {
                    index,
                    visual_type: child.visual().visual_type(),
                });
            };

            let child_context = ExecutionContext {
                config_path: Some(child.source().to_path_buf()),
                project_root: context.project_root.clone(),
                case_key: Some(child_case_key(case_key, child, index)),
                options: child_options.clone(),
            };
            tracing::debug!(
                parent = case_key,
                child = child_context.case_key.as_deref(),
                "executing frame child"
            );

            let result = self.execute(child.visual(), &child_context)?;
            let dataset = result.datasets.first().cloned().ok_or_else(|| {
                PipelineError::invariant(format!("frame child {index} produced no dataset"))
            })?;
            pairs.push((Arc::clone(matrix), dataset));
            children.push(result);
        }

        log_stage(PipelineStage::Rendering, &visual, case_key);
        let figure = self.renderer.render_frame(frame, &pairs)?;

        log_stage(PipelineStage::OutputEmission, &visual, case_key);
        let options = &context.options;
        let report = emit_outputs(
            self.renderer.as_ref(),
            &figure,
            &options.outputs,
            options.png_scale,
        );

        Ok(VisualExecutionResult {
            visual,
            case_key: context.case_key.clone(),
            figure,
            plans: Vec::new(),
            datasets: pairs.into_iter().map(|(_, dataset)| dataset).collect(),
            outputs: report.artifacts,
            output_failures: report.failures,
            children,
        })
    }
}

fn log_stage(stage: PipelineStage, visual: &Visual, case_key: Option<&str>) {
    tracing::debug!(%stage, visual_type = visual.visual_type(), case_key, "pipeline stage");
}

// ============================================================================
// Invariants
// ============================================================================

/// Apply the optional sort and the toggled dataset checks.
fn check_invariants(
    visual: &MatrixVisual,
    plan: &DaxQueryPlan,
    dataset: &mut Dataset,
    context: &ExecutionContext,
) -> Result<(), PipelineError> {
    let options = &context.options;

    if options.sort_rows && !dataset.is_empty() {
        dataset.sort_by_row_fields();
    }

    if options.ensure_non_empty_rows && dataset.is_empty() {
        return Err(PipelineError::invariant("matrix data provider returned no rows"));
    }

    if options.ensure_values_present {
        if let Some(first) = dataset.rows.first() {
            for value in visual.values() {
                let present = first.get(value.label()).is_some_and(|v| !v.is_null());
                if !present {
                    return Err(PipelineError::invariant(format!(
                        "value '{}' missing from dataset row",
                        value.label()
                    )));
                }
            }
        }
    }

    if options.validate_define {
        let declared = visual.define().map(str::trim).filter(|d| !d.is_empty());
        if plan.define.as_deref() != declared {
            return Err(PipelineError::invariant(match declared {
                Some(_) => "compiled DEFINE block does not match the declared define",
                None => "compiled plan carries a DEFINE block the visual never declared",
            }));
        }
    }

    Ok(())
}

// ============================================================================
// Case keys
// ============================================================================

/// Case key of the `index`th (1-based) frame child.
pub fn child_case_key(parent: Option<&str>, child: &FrameChild, index: usize) -> String {
    let slug = match child.visual().title().filter(|title| !title.is_empty()) {
        Some(title) => slugify(title),
        None => stem(child.source())
            .map(slugify)
            .unwrap_or_else(|| format!("child_{index}")),
    };

    match parent.filter(|parent| !parent.is_empty()) {
        Some(parent) => format!("{parent}__{slug}"),
        None => slug,
    }
}

fn stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

/// Lowercase, spaces to underscores, keep alphanumerics, `_` and `-`.
pub fn slugify(value: &str) -> String {
    let slug: String = value
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}
