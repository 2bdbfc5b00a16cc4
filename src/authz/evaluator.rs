use serde::{Deserialize, Serialize};

use super::access::WorkflowAccess;
use super::org_chart::OrgChartRoleResolver;
use super::principal::Principal;
use super::request::RequestContext;
use super::requirements::{bypass_group, build_groups, Requirement, UnmetRequirement};
use crate::errors::{AppError, AppResult, UnauthorizedWorkflow};

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmet: Vec<UnmetRequirement>,
}

impl Outcome {
    pub fn granted() -> Self {
        Self {
            success: true,
            unmet: Vec::new(),
        }
    }

    pub fn denied(unmet: Vec<UnmetRequirement>) -> Self {
        Self { success: false, unmet }
    }
}

/// Policy evaluator trait for pluggable authorization logic
pub trait PolicyEvaluator: Send + Sync {
    /// Decide whether `principal` may act on the current workflow step of `ctx`.
    fn evaluate(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        access: &WorkflowAccess,
        org_chart: &dyn OrgChartRoleResolver,
    ) -> Outcome;

    /// Like [`PolicyEvaluator::evaluate`], turning a denial into `AppError::UnauthorizedWorkflow`.
    fn authorize(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        access: &WorkflowAccess,
        org_chart: &dyn OrgChartRoleResolver,
    ) -> AppResult<()> {
        let outcome = self.evaluate(principal, ctx, access, org_chart);
        if outcome.success {
            return Ok(());
        }
        Err(AppError::UnauthorizedWorkflow(UnauthorizedWorkflow {
            subtype: ctx.subtype.clone(),
            step: ctx.current_step.clone(),
            unmet: outcome.unmet,
        }))
    }
}

/// Default evaluator for workflow steps
///
/// Evaluation order:
/// 1. trusted application or global full control -> allow
/// 2. any requirement of any enabled group -> allow
/// 3. deny, reporting every unmet requirement once
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyEvaluator for DefaultPolicyEvaluator {
    fn evaluate(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        access: &WorkflowAccess,
        org_chart: &dyn OrgChartRoleResolver,
    ) -> Outcome {
        // 1. Bypass
        if let Some(requirement) = bypass_group()
            .requirements
            .iter()
            .find(|r| r.is_satisfied_by(principal, org_chart))
        {
            tracing::debug!(
                person_id = %principal.person_id,
                request_id = %ctx.request_id,
                requirement = requirement.code(),
                "authorization bypass"
            );
            return Outcome::granted();
        }

        // 2. Alternative access paths
        let groups = build_groups(ctx, access);
        let mut unmet: Vec<UnmetRequirement> = Vec::new();

        for group in &groups {
            for requirement in &group.requirements {
                if requirement.is_satisfied_by(principal, org_chart) {
                    tracing::debug!(
                        person_id = %principal.person_id,
                        request_id = %ctx.request_id,
                        step = %ctx.current_step,
                        group = group.name,
                        requirement = requirement.code(),
                        "requirement satisfied"
                    );
                    return Outcome::granted();
                }
                if requirement.is_reportable() {
                    let entry = UnmetRequirement::from(requirement);
                    if !unmet.contains(&entry) {
                        unmet.push(entry);
                    }
                }
            }
        }

        // 3. Deny
        if groups.is_empty() {
            unmet.push(UnmetRequirement::from(&Requirement::NoAccessPath));
        }

        tracing::info!(
            person_id = %principal.person_id,
            request_id = %ctx.request_id,
            subtype = %ctx.subtype,
            step = %ctx.current_step,
            unmet = ?unmet.iter().map(|r| r.code.as_str()).collect::<Vec<_>>(),
            "workflow step denied"
        );
        Outcome::denied(unmet)
    }
}
