use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use resource_authz::authz::{
    Claim, OrgChartMemberships, Principal, RequestContext, RequestSubtype, WorkflowAccessTable,
};
use resource_authz::events::init_event_bus;
use resource_authz::workflow::{Actor, StepState, Workflow};
use resource_authz::{AppError, ResourceRequest, StepCommands};

const TABLE: &str = r#"
[[access]]
subtype = "normal"
step = "created"
creator = true

[[access]]
subtype = "normal"
step = "proposal"
sibling_resource_owner = true

[[access]]
subtype = "normal"
step = "approval"
org_chart_task_owner = true
"#;

fn new_request(created_by: Uuid, project_id: Uuid) -> ResourceRequest {
    let context = RequestContext::new(Uuid::new_v4(), "normal", "created", project_id, created_by)
        .with_department("TPD PRD MY TEST DEP1");
    let workflow = Workflow::for_subtype(RequestSubtype::Normal, Utc::now()).unwrap();
    ResourceRequest::new(context, workflow)
}

#[test]
fn full_chain_reaches_completion() {
    let creator = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let task_owner = Uuid::new_v4();
    let project_id = Uuid::new_v4();
    let commands = StepCommands::new(Arc::new(WorkflowAccessTable::from_toml_str(TABLE).unwrap()));
    let none = OrgChartMemberships::new();
    let mut req = new_request(creator, project_id);
    let now = Utc::now();

    commands
        .approve_current_step(&Actor::person(creator, None), &Principal::new(creator), &none, &mut req, now)
        .unwrap();

    let owner_principal = Principal::new(owner).with_claims(vec![Claim::resource_owner("TPD PRD MY TEST")]);
    commands
        .approve_current_step(&Actor::person(owner, None), &owner_principal, &none, &mut req, now)
        .unwrap();

    let org_chart = OrgChartMemberships::new().with_task_ownership(project_id, Uuid::new_v4(), Uuid::new_v4());
    commands
        .approve_current_step(&Actor::person(task_owner, None), &Principal::new(task_owner), &org_chart, &mut req, now)
        .unwrap();

    let last = commands.skip_current_step(&Actor::System, &mut req, now).unwrap();
    assert!(last.workflow_completed);
    assert_eq!(last.started_step, None);
    assert!(req.workflow.is_completed());

    let approval = req.workflow.step("approval").unwrap();
    assert_eq!(approval.state, StepState::Approved);
    assert_eq!(approval.completed_by, Some(Actor::person(task_owner, None)));
    assert_eq!(req.workflow.step("provisioning").unwrap().completed_by, None);
}

#[test]
fn system_actor_approves_without_authorization() {
    let commands = StepCommands::new(Arc::new(WorkflowAccessTable::empty()));
    let mut req = new_request(Uuid::new_v4(), Uuid::new_v4());

    let transition = commands
        .approve_current_step(
            &Actor::System,
            &Principal::new(Uuid::new_v4()),
            &OrgChartMemberships::new(),
            &mut req,
            Utc::now(),
        )
        .unwrap();

    assert_eq!(transition.state, StepState::Approved);
    assert_eq!(req.workflow.step("created").unwrap().completed_by, Some(Actor::System));
}

#[tokio::test]
async fn denial_leaves_step_pending_and_publishes_event() {
    let (bus, mut rx) = init_event_bus();
    let commands =
        StepCommands::new(Arc::new(WorkflowAccessTable::from_toml_str(TABLE).unwrap())).with_event_bus(bus);
    let mut req = new_request(Uuid::new_v4(), Uuid::new_v4());
    let stranger = Uuid::new_v4();

    let err = commands
        .approve_current_step(
            &Actor::person(stranger, None),
            &Principal::new(stranger),
            &OrgChartMemberships::new(),
            &mut req,
            Utc::now(),
        )
        .unwrap_err();

    assert!(matches!(err, AppError::UnauthorizedWorkflow(_)));
    assert_eq!(err.unmet_requirements()[0].code, "creator");
    assert_eq!(req.workflow.active_step().unwrap().id, "created");

    let event = rx.recv().await.unwrap();
    assert_eq!(event.name, "authz.denied");
    assert_eq!(event.subject_id, req.context.request_id);
    assert_eq!(event.payload["unmet"][0]["code"], "creator");
}

#[tokio::test]
async fn approvals_are_published() {
    let (bus, mut rx) = init_event_bus();
    let creator = Uuid::new_v4();
    let commands =
        StepCommands::new(Arc::new(WorkflowAccessTable::from_toml_str(TABLE).unwrap())).with_event_bus(bus);
    let mut req = new_request(creator, Uuid::new_v4());

    commands
        .approve_current_step(
            &Actor::person(creator, None),
            &Principal::new(creator),
            &OrgChartMemberships::new(),
            &mut req,
            Utc::now(),
        )
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.name, "workflow_step.approved");
    assert_eq!(event.payload["id"], "created");
}
