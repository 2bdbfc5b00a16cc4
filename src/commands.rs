//! Step use cases: approve, reject and skip the active step of a request.
//!
//! Every command takes the acting [`Actor`] explicitly. A person actor is authorized
//! against the access table for the request's subtype and active step; the system actor
//! is not, and is recorded as such on the step.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::{
    DefaultPolicyEvaluator, OrgChartRoleResolver, PolicyEvaluator, Principal, RequestContext, WorkflowAccessTable,
};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, AccessDenial, EventBus};
use crate::workflow::{Actor, StepState, Workflow};

/// A request and its approval chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub context: RequestContext,
    pub workflow: Workflow,
}

impl ResourceRequest {
    /// Keeps `context.current_step` on the name of the active step.
    pub fn new(context: RequestContext, workflow: Workflow) -> Self {
        let mut request = Self { context, workflow };
        request.sync_current_step();
        request
    }

    fn sync_current_step(&mut self) {
        if let Some(active) = self.workflow.active_step() {
            self.context.current_step = active.name.clone();
        }
    }
}

/// What a command changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepTransition {
    pub request_id: Uuid,
    pub step_id: String,
    pub state: StepState,
    /// The step started by this command, if any.
    pub started_step: Option<String>,
    pub workflow_completed: bool,
}

pub struct StepCommands<E = DefaultPolicyEvaluator> {
    access: Arc<WorkflowAccessTable>,
    evaluator: E,
    event_bus: Option<EventBus>,
}

impl StepCommands<DefaultPolicyEvaluator> {
    pub fn new(access: Arc<WorkflowAccessTable>) -> Self {
        Self {
            access,
            evaluator: DefaultPolicyEvaluator::new(),
            event_bus: None,
        }
    }
}

impl<E: PolicyEvaluator> StepCommands<E> {
    pub fn with_evaluator<F: PolicyEvaluator>(self, evaluator: F) -> StepCommands<F> {
        StepCommands {
            access: self.access,
            evaluator,
            event_bus: self.event_bus,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn access_table(&self) -> &WorkflowAccessTable {
        &self.access
    }

    pub fn approve_current_step(
        &self,
        actor: &Actor,
        principal: &Principal,
        org_chart: &dyn OrgChartRoleResolver,
        request: &mut ResourceRequest,
        now: DateTime<Utc>,
    ) -> AppResult<StepTransition> {
        let step_id = self.active_step_id(request)?;
        self.authorize(actor, principal, org_chart, request, &step_id)?;

        let mut workflow = request.workflow.clone();
        workflow.step_mut(&step_id)?.approve(actor.clone(), now)?;
        let started_step = start_next(&mut workflow, &step_id, now)?;
        commit(request, workflow);

        self.publish(request, &step_id, "approved", Some(actor));
        tracing::info!(
            request_id = %request.context.request_id,
            step = %step_id,
            actor = %actor,
            "step approved"
        );

        Ok(self.transition(request, step_id, StepState::Approved, started_step))
    }

    /// Rejects the active step. The workflow halts: no later step is started.
    pub fn reject_current_step(
        &self,
        actor: &Actor,
        principal: &Principal,
        org_chart: &dyn OrgChartRoleResolver,
        request: &mut ResourceRequest,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<StepTransition> {
        let step_id = self.active_step_id(request)?;
        self.authorize(actor, principal, org_chart, request, &step_id)?;

        let mut workflow = request.workflow.clone();
        workflow.step_mut(&step_id)?.reject(actor.clone(), reason, now)?;
        commit(request, workflow);

        self.publish(request, &step_id, "rejected", Some(actor));
        tracing::info!(
            request_id = %request.context.request_id,
            step = %step_id,
            actor = %actor,
            reason,
            "step rejected, workflow halted"
        );

        Ok(self.transition(request, step_id, StepState::Rejected, None))
    }

    /// Skips the active step. Only the system actor may skip, and nobody is recorded as
    /// having completed the step.
    pub fn skip_current_step(
        &self,
        actor: &Actor,
        request: &mut ResourceRequest,
        now: DateTime<Utc>,
    ) -> AppResult<StepTransition> {
        if !actor.is_system() {
            return Err(AppError::contract_violation("only the system actor can skip workflow steps"));
        }

        let step_id = self.active_step_id(request)?;
        let mut workflow = request.workflow.clone();
        workflow.step_mut(&step_id)?.skip(now)?;
        let started_step = start_next(&mut workflow, &step_id, now)?;
        commit(request, workflow);

        self.publish(request, &step_id, "skipped", Some(actor));
        tracing::info!(request_id = %request.context.request_id, step = %step_id, "step skipped");

        Ok(self.transition(request, step_id, StepState::Skipped, started_step))
    }

    fn active_step_id(&self, request: &ResourceRequest) -> AppResult<String> {
        if request.workflow.is_rejected() {
            return Err(AppError::bad_request(format!(
                "request {} was rejected, its workflow is halted",
                request.context.request_id
            )));
        }
        if request.workflow.is_completed() {
            return Err(AppError::bad_request(format!(
                "workflow of request {} is already completed",
                request.context.request_id
            )));
        }
        request
            .workflow
            .active_step()
            .map(|step| step.id.clone())
            .ok_or_else(|| {
                AppError::invalid_workflow(format!("request {} has no active step", request.context.request_id))
            })
    }

    fn authorize(
        &self,
        actor: &Actor,
        principal: &Principal,
        org_chart: &dyn OrgChartRoleResolver,
        request: &ResourceRequest,
        step_id: &str,
    ) -> AppResult<()> {
        let person_id = match actor {
            Actor::System => {
                tracing::debug!(request_id = %request.context.request_id, step = %step_id, "system actor, authorization skipped");
                return Ok(());
            }
            Actor::Person { id, .. } => *id,
        };

        if person_id != principal.person_id {
            return Err(AppError::contract_violation(format!(
                "actor {} does not match principal {}",
                person_id, principal.person_id
            )));
        }

        // The table is keyed by step name; ids are per-workflow.
        let step_name = request
            .workflow
            .step(step_id)
            .map(|step| step.name.clone())
            .ok_or_else(|| AppError::not_found(format!("workflow step '{step_id}'")))?;
        let mut ctx = request.context.clone();
        ctx.current_step = step_name.clone();

        let access = self.access.lookup(&ctx.subtype, &step_name);
        let result = self.evaluator.authorize(principal, &ctx, &access, org_chart);

        if let Err(err) = &result {
            if let Some(bus) = &self.event_bus {
                let denial = AccessDenial {
                    person_id,
                    subtype: request.context.subtype.clone(),
                    step: step_name,
                    unmet: err.unmet_requirements().to_vec(),
                };
                log_activity(bus, "denied", Some(actor), request.context.request_id, &denial);
            }
        }

        result
    }

    fn publish(&self, request: &ResourceRequest, step_id: &str, action: &str, actor: Option<&Actor>) {
        let (Some(bus), Some(step)) = (&self.event_bus, request.workflow.step(step_id)) else {
            return;
        };
        log_activity(bus, action, actor, request.context.request_id, step);
    }

    fn transition(
        &self,
        request: &ResourceRequest,
        step_id: String,
        state: StepState,
        started_step: Option<String>,
    ) -> StepTransition {
        StepTransition {
            request_id: request.context.request_id,
            step_id,
            state,
            started_step,
            workflow_completed: request.workflow.is_completed(),
        }
    }
}

/// Starts the step after `step_id`, if there is one.
fn start_next(workflow: &mut Workflow, step_id: &str, now: DateTime<Utc>) -> AppResult<Option<String>> {
    let next = workflow.next_of(step_id).map(|step| step.id.clone());
    if let Some(next_id) = &next {
        workflow.step_mut(next_id)?.start(now)?;
    }
    Ok(next)
}

/// Swaps in the transitioned workflow.
fn commit(request: &mut ResourceRequest, workflow: Workflow) {
    request.workflow = workflow;
    request.sync_current_step();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{Claim, OrgChartMemberships, RequestSubtype};
    use crate::workflow::WorkflowStep;

    fn request(created_by: Uuid) -> ResourceRequest {
        let context = RequestContext::new(Uuid::new_v4(), "normal", "created", Uuid::new_v4(), created_by)
            .with_department("TPD PRD MY TEST DEP1");
        let workflow = Workflow::for_subtype(RequestSubtype::Normal, Utc::now()).unwrap();
        ResourceRequest::new(context, workflow)
    }

    #[test]
    fn creator_approves_created_step_and_next_step_starts() {
        let creator = Uuid::new_v4();
        let mut req = request(creator);
        let commands = StepCommands::new(Arc::new(WorkflowAccessTable::builtin()));

        let transition = commands
            .approve_current_step(
                &Actor::person(creator, None),
                &Principal::new(creator),
                &OrgChartMemberships::new(),
                &mut req,
                Utc::now(),
            )
            .unwrap();

        assert_eq!(transition.step_id, "created");
        assert_eq!(transition.started_step.as_deref(), Some("proposal"));
        assert_eq!(req.workflow.active_step().unwrap().id, "proposal");
        assert_eq!(req.context.current_step, "Proposal");
    }

    #[test]
    fn rejection_halts_the_workflow() {
        let owner = Uuid::new_v4();
        let mut req = request(Uuid::new_v4());
        let commands = StepCommands::new(Arc::new(WorkflowAccessTable::builtin()));
        let now = Utc::now();

        commands.skip_current_step(&Actor::System, &mut req, now).unwrap();

        let principal = Principal::new(owner).with_claims(vec![Claim::resource_owner("TPD PRD MY TEST DEP1")]);
        let transition = commands
            .reject_current_step(
                &Actor::person(owner, None),
                &principal,
                &OrgChartMemberships::new(),
                &mut req,
                "not needed",
                now,
            )
            .unwrap();

        assert_eq!(transition.state, StepState::Rejected);
        assert_eq!(transition.started_step, None);
        assert!(req.workflow.active_step().is_none());
        assert!(!req.workflow.step("approval").unwrap().is_started());

        let again = commands.skip_current_step(&Actor::System, &mut req, now);
        assert!(matches!(again, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn only_system_can_skip() {
        let person = Uuid::new_v4();
        let mut req = request(person);
        let commands = StepCommands::new(Arc::new(WorkflowAccessTable::builtin()));

        let err = commands
            .skip_current_step(&Actor::person(person, None), &mut req, Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::ContractViolation(_)));
    }

    #[test]
    fn actor_must_match_principal() {
        let mut req = request(Uuid::new_v4());
        let commands = StepCommands::new(Arc::new(WorkflowAccessTable::builtin()));

        let err = commands
            .approve_current_step(
                &Actor::person(Uuid::new_v4(), None),
                &Principal::new(Uuid::new_v4()),
                &OrgChartMemberships::new(),
                &mut req,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::ContractViolation(_)));
    }

    #[test]
    fn access_is_looked_up_by_step_name_not_id() {
        let creator = Uuid::new_v4();
        let mut created = WorkflowStep::new("step-1", "Created");
        created.next_step = Some("step-2".to_string());
        let mut proposal = WorkflowStep::new("step-2", "Proposal");
        proposal.previous_step = Some("step-1".to_string());
        let mut workflow = Workflow::from_steps(vec![created, proposal]).unwrap();
        workflow.step_mut("step-1").unwrap().start(Utc::now()).unwrap();

        let context = RequestContext::new(Uuid::new_v4(), "normal", "", Uuid::new_v4(), creator);
        let mut req = ResourceRequest::new(context, workflow);
        assert_eq!(req.context.current_step, "Created");

        let commands = StepCommands::new(Arc::new(WorkflowAccessTable::builtin()));
        let transition = commands
            .approve_current_step(
                &Actor::person(creator, None),
                &Principal::new(creator),
                &OrgChartMemberships::new(),
                &mut req,
                Utc::now(),
            )
            .unwrap();

        assert_eq!(transition.step_id, "step-1");
        assert_eq!(transition.started_step.as_deref(), Some("step-2"));
        assert_eq!(req.context.current_step, "Proposal");
    }

    #[test]
    fn failed_advance_leaves_the_workflow_untouched() {
        let creator = Uuid::new_v4();
        let mut req = request(creator);
        req.workflow.step_mut("proposal").unwrap().state = StepState::Unknown;
        let before = req.workflow.clone();
        let commands = StepCommands::new(Arc::new(WorkflowAccessTable::builtin()));

        let err = commands
            .approve_current_step(
                &Actor::person(creator, None),
                &Principal::new(creator),
                &OrgChartMemberships::new(),
                &mut req,
                Utc::now(),
            )
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(req.workflow, before);
        let created = req.workflow.step("created").unwrap();
        assert_eq!(created.state, StepState::Pending);
        assert_eq!(created.completed, None);

        let err = commands.skip_current_step(&Actor::System, &mut req, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(req.workflow, before);
    }
}
