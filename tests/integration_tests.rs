//! Integration tests for the approval workflow engine
//!
//! These tests drive full router runs against in-memory ports and a
//! scripted decision oracle.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use accessflow::engine::audit;
use accessflow::engine::gateway::{GatewayOutcome, ResumptionGateway};
use accessflow::engine::nodes::{
    ApprovalOpsNode, CommunicationNode, ProvisioningNode, TicketingNode,
};
use accessflow::engine::record::ApprovalStatus;
use accessflow::engine::resolver::{ApprovalHierarchy, ApprovalResolver};
use accessflow::engine::router::{Router, RouterConfig, Terminal, Trigger};
use accessflow::engine::steps::StepTag;
use accessflow::engine::store::WorkflowStore;
use accessflow::error::FlowError;
use accessflow::oracle::DecisionOracle;
use accessflow::ports::{
    CommunicationPort, GrantSpec, IssueTrackerPort, MailPort, ProvisionOutcome, ProvisioningPort,
    TicketComment, TicketInfo, TicketSnapshot,
};

// ============================================================================
// Mock Components
// ============================================================================

/// Oracle that returns predefined labels, repeating the last one
struct ScriptedOracle {
    responses: Vec<String>,
    response_index: AtomicUsize,
}

impl ScriptedOracle {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: responses.iter().map(|s| s.to_string()).collect(),
            response_index: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, _context: &str) -> Result<String, FlowError> {
        let idx = self.response_index.fetch_add(1, Ordering::SeqCst);
        let idx = idx.min(self.responses.len() - 1);
        Ok(self.responses[idx].clone())
    }
}

#[derive(Default)]
struct MockChat {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl CommunicationPort for MockChat {
    async fn send(&self, _channel: &str, _thread: &str, text: &str) -> Result<(), FlowError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[derive(Default, Clone)]
struct StoredTicket {
    description: String,
    status: String,
    comments: Vec<TicketComment>,
}

/// In-memory issue tracker
#[derive(Default)]
struct MockTracker {
    tickets: Mutex<HashMap<String, StoredTicket>>,
    created: AtomicUsize,
}

impl MockTracker {
    fn seed(&self, ticket_ref: &str, description: &str, comments: Vec<(&str, &str)>) {
        self.tickets.lock().unwrap().insert(
            ticket_ref.to_string(),
            StoredTicket {
                description: description.to_string(),
                status: "Open".to_string(),
                comments: comments
                    .into_iter()
                    .map(|(author, body)| TicketComment {
                        author: author.to_string(),
                        body: body.to_string(),
                        created: None,
                    })
                    .collect(),
            },
        );
    }

    fn status_of(&self, ticket_ref: &str) -> String {
        self.tickets.lock().unwrap()[ticket_ref].status.clone()
    }
}

#[async_trait]
impl IssueTrackerPort for MockTracker {
    async fn create(
        &self,
        _project: &str,
        _summary: &str,
        description: &str,
    ) -> Result<TicketInfo, FlowError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket_ref = format!("OPS-{}", n);
        self.tickets.lock().unwrap().insert(
            ticket_ref.clone(),
            StoredTicket {
                description: description.to_string(),
                status: "Open".to_string(),
                comments: vec![],
            },
        );
        Ok(TicketInfo {
            link: format!("https://tracker/browse/{}", ticket_ref),
            ticket_ref,
        })
    }

    async fn get(&self, ticket_ref: &str) -> Result<TicketSnapshot, FlowError> {
        let tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .get(ticket_ref)
            .ok_or_else(|| FlowError::port("tracker", "issue not found"))?;
        Ok(TicketSnapshot {
            ticket_ref: ticket_ref.to_string(),
            status: ticket.status.clone(),
            description: ticket.description.clone(),
            comments: ticket.comments.clone(),
        })
    }

    async fn add_comment(&self, ticket_ref: &str, text: &str) -> Result<(), FlowError> {
        let mut tickets = self.tickets.lock().unwrap();
        if let Some(ticket) = tickets.get_mut(ticket_ref) {
            ticket.comments.push(TicketComment {
                author: "bot".to_string(),
                body: text.to_string(),
                created: None,
            });
        }
        Ok(())
    }

    async fn update_description(
        &self,
        ticket_ref: &str,
        description: &str,
    ) -> Result<(), FlowError> {
        let mut tickets = self.tickets.lock().unwrap();
        if let Some(ticket) = tickets.get_mut(ticket_ref) {
            ticket.description = description.to_string();
        }
        Ok(())
    }

    async fn transition(&self, ticket_ref: &str, target: &str) -> Result<(), FlowError> {
        let mut tickets = self.tickets.lock().unwrap();
        if let Some(ticket) = tickets.get_mut(ticket_ref) {
            ticket.status = target.to_string();
        }
        Ok(())
    }
}

#[derive(Default)]
struct MockMail {
    sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl MailPort for MockMail {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), FlowError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct MockProvisioner {
    applied: Mutex<Vec<GrantSpec>>,
}

#[async_trait]
impl ProvisioningPort for MockProvisioner {
    async fn apply(&self, spec: &GrantSpec) -> Result<ProvisionOutcome, FlowError> {
        self.applied.lock().unwrap().push(spec.clone());
        Ok(ProvisionOutcome::Applied {
            resource_ids: vec!["grp-prod-db".to_string()],
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    router: Arc<Router>,
    chat: Arc<MockChat>,
    tracker: Arc<MockTracker>,
    mail: Arc<MockMail>,
    provisioner: Arc<MockProvisioner>,
}

/// Static approval hierarchy shared by the scenarios
static HIERARCHY: Lazy<ApprovalHierarchy> = Lazy::new(|| {
    let mut managers = std::collections::BTreeMap::new();
    managers.insert("bob@co".to_string(), vec!["alice@co".to_string()]);
    ApprovalHierarchy {
        managers,
        fallback_approvers: vec!["security@co".to_string()],
    }
});

fn harness(oracle: Arc<dyn DecisionOracle>) -> Harness {
    let chat = Arc::new(MockChat::default());
    let tracker = Arc::new(MockTracker::default());
    let mail = Arc::new(MockMail::default());
    let provisioner = Arc::new(MockProvisioner::default());
    let resolver = Arc::new(ApprovalResolver::new(HIERARCHY.clone()));

    let router = Arc::new(Router::new(
        WorkflowStore::new(),
        oracle,
        RouterConfig {
            // Tests poll immediately instead of waiting out the gate.
            poll_interval: Duration::ZERO,
            ..RouterConfig::default()
        },
        CommunicationNode::new(chat.clone()),
        TicketingNode::new(tracker.clone(), "OPS"),
        ApprovalOpsNode::new(resolver, tracker.clone(), mail.clone()),
        ProvisioningNode::new(provisioner.clone()),
    ));

    Harness {
        router,
        chat,
        tracker,
        mail,
        provisioner,
    }
}

async fn start_workflow(h: &Harness, key: &str) {
    let record = accessflow::engine::record::WorkflowRecord::new(key, "alice@co", "prod-db")
        .with_thread("C1", "1726.55");
    h.router.store().create_if_absent(record).await;
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_end_to_end_approval_flow() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "COMMUNICATION",
        "TICKETING",
        "APPROVALOPS",
    ]));
    let h = harness(oracle);
    start_workflow(&h, "conv:1726.55").await;

    // Chat mention: ack, ticket, approver notification, then wait.
    let terminal = h.router.run("conv:1726.55", Trigger::ChatMention).await;
    assert_eq!(terminal, Terminal::Complete);

    let record = h.router.store().get("conv:1726.55").await.unwrap();
    assert_eq!(record.ticket_ref.as_deref(), Some("OPS-1"));
    assert_eq!(record.approval_status, ApprovalStatus::Pending);
    assert_eq!(record.required_approvers, BTreeSet::from(["bob@co".to_string()]));
    assert_eq!(h.mail.sent.lock().unwrap().len(), 1);
    assert_eq!(h.mail.sent.lock().unwrap()[0].0, "bob@co");
    assert!(h.provisioner.applied.lock().unwrap().is_empty());

    // The approver comments on the ticket.
    h.tracker
        .tickets
        .lock()
        .unwrap()
        .get_mut("OPS-1")
        .unwrap()
        .comments
        .push(TicketComment {
            author: "bob@co".to_string(),
            body: "Approved, go ahead".to_string(),
            created: None,
        });

    let terminal = h
        .router
        .run(
            "conv:1726.55",
            Trigger::TicketComment {
                author: "bob@co".to_string(),
                body: "Approved, go ahead".to_string(),
            },
        )
        .await;
    assert_eq!(terminal, Terminal::Complete);

    // Grant applied, ticket closed, requester told, workflow gone.
    assert_eq!(h.provisioner.applied.lock().unwrap().len(), 1);
    assert_eq!(h.provisioner.applied.lock().unwrap()[0].requester_id, "alice@co");
    assert_eq!(h.tracker.status_of("OPS-1"), "Done");
    assert!(h.router.store().get("conv:1726.55").await.is_none());

    let sent = h.chat.sent.lock().unwrap();
    assert!(sent.iter().any(|m| m.contains("processing your access request")));
    assert!(sent.iter().any(|m| m.contains("fully approved")));
}

#[tokio::test]
async fn test_loop_cap_aborts_with_single_notice() {
    // An oracle that never produces a usable label must not loop forever.
    let oracle = Arc::new(ScriptedOracle::new(&["DEFINITELY_NOT_A_LABEL"]));
    let h = harness(oracle.clone());
    start_workflow(&h, "conv:1726.55").await;

    let terminal = h.router.run("conv:1726.55", Trigger::ChatMention).await;
    assert_eq!(terminal, Terminal::Aborted);

    // Three attempts per cycle, cap_simple cycles, then teardown.
    let cap = RouterConfig::default().cap_simple as usize;
    assert_eq!(oracle.response_index.load(Ordering::SeqCst), 3 * cap);
    assert!(h.router.store().get("conv:1726.55").await.is_none());

    let sent = h.chat.sent.lock().unwrap();
    let notices: Vec<_> = sent.iter().filter(|m| m.contains("stopped processing")).collect();
    assert_eq!(notices.len(), 1);
}

#[tokio::test]
async fn test_aborted_workflow_is_gone_and_not_renotified() {
    let oracle = Arc::new(ScriptedOracle::new(&["DEFINITELY_NOT_A_LABEL"]));
    let h = harness(oracle);
    start_workflow(&h, "conv:1726.55").await;

    let terminal = h.router.run("conv:1726.55", Trigger::ChatMention).await;
    assert_eq!(terminal, Terminal::Aborted);

    // The poller must find nothing to pick up, and late triggers must be
    // no-ops instead of repeating the abort notice.
    assert!(h.router.store().pending_keys().await.is_empty());
    for _ in 0..5 {
        let terminal = h.router.run("conv:1726.55", Trigger::TimerTick).await;
        assert_eq!(terminal, Terminal::Complete);
    }

    let sent = h.chat.sent.lock().unwrap();
    let notices = sent.iter().filter(|m| m.contains("stopped processing")).count();
    assert_eq!(notices, 1);
}

#[tokio::test]
async fn test_idle_polls_never_exhaust_the_cap() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "COMMUNICATION",
        "TICKETING",
        "APPROVALOPS",
    ]));
    let h = harness(oracle);
    start_workflow(&h, "conv:1726.55").await;
    h.router.run("conv:1726.55", Trigger::ChatMention).await;

    // A workflow that waits on humans gets polled many times; each poll is
    // its own run with a fresh cycle budget.
    for _ in 0..20 {
        let terminal = h.router.run("conv:1726.55", Trigger::TimerTick).await;
        assert_eq!(terminal, Terminal::Complete);
    }

    let record = h.router.store().get("conv:1726.55").await.unwrap();
    assert_eq!(record.approval_status, ApprovalStatus::Pending);
    assert!(record.iterations > RouterConfig::default().cap_full);
    assert!(h
        .chat
        .sent
        .lock()
        .unwrap()
        .iter()
        .all(|m| !m.contains("stopped processing")));
}

#[tokio::test]
async fn test_duplicate_trigger_creates_one_ticket() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "COMMUNICATION",
        "TICKETING",
        "APPROVALOPS",
    ]));
    let h = harness(oracle);
    start_workflow(&h, "conv:1726.55").await;

    h.router.run("conv:1726.55", Trigger::ChatMention).await;
    // Retry delivery of the same mention.
    h.router.run("conv:1726.55", Trigger::ChatMention).await;

    assert_eq!(h.tracker.created.load(Ordering::SeqCst), 1);
    assert_eq!(h.mail.sent.lock().unwrap().len(), 1);

    let acks: Vec<_> = h
        .chat
        .sent
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m.contains("processing your access request"))
        .cloned()
        .collect();
    assert_eq!(acks.len(), 1);
}

#[tokio::test]
async fn test_approval_status_is_monotonic_across_runs() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "COMMUNICATION",
        "TICKETING",
        "APPROVALOPS",
    ]));
    let h = harness(oracle);
    start_workflow(&h, "conv:1726.55").await;
    h.router.run("conv:1726.55", Trigger::ChatMention).await;

    h.tracker.seed(
        "OPS-1",
        &h.tracker.get("OPS-1").await.unwrap().description,
        vec![("bob@co", "approved")],
    );
    h.router.run("conv:1726.55", Trigger::TimerTick).await;

    // A later empty poll must not regress the status; the workflow is gone
    // because it completed, which is the strongest form of "not pending".
    assert!(h.router.store().get("conv:1726.55").await.is_none());
    assert_eq!(h.tracker.status_of("OPS-1"), "Done");
}

#[tokio::test]
async fn test_timer_poll_without_new_approvals_keeps_waiting() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "COMMUNICATION",
        "TICKETING",
        "APPROVALOPS",
    ]));
    let h = harness(oracle);
    start_workflow(&h, "conv:1726.55").await;
    h.router.run("conv:1726.55", Trigger::ChatMention).await;

    let terminal = h.router.run("conv:1726.55", Trigger::TimerTick).await;
    assert_eq!(terminal, Terminal::Complete);

    let record = h.router.store().get("conv:1726.55").await.unwrap();
    assert_eq!(record.approval_status, ApprovalStatus::Pending);
    assert!(record.approved_by.is_empty());
    assert!(h.provisioner.applied.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_approvers_fails_workflow() {
    let oracle = Arc::new(ScriptedOracle::new(&["APPROVALOPS"]));
    let chat = Arc::new(MockChat::default());
    let tracker = Arc::new(MockTracker::default());
    let resolver = Arc::new(ApprovalResolver::new(ApprovalHierarchy::default()));

    let router = Arc::new(Router::new(
        WorkflowStore::new(),
        oracle,
        RouterConfig::default(),
        CommunicationNode::new(chat.clone()),
        TicketingNode::new(tracker.clone(), "OPS"),
        ApprovalOpsNode::new(resolver, tracker.clone(), Arc::new(MockMail::default())),
        ProvisioningNode::new(Arc::new(MockProvisioner::default())),
    ));

    let mut record = accessflow::engine::record::WorkflowRecord::new(
        "conv:1726.55",
        "alice@co",
        "prod-db",
    )
    .with_thread("C1", "1726.55");
    record.ticket_ref = Some("OPS-1".to_string());
    record.steps_completed.insert(StepTag::AckSent);
    record.steps_completed.insert(StepTag::TicketCreated);
    router.store().create_if_absent(record).await;

    let terminal = router.run("conv:1726.55", Trigger::ChatMention).await;
    assert_eq!(terminal, Terminal::Failed);
    assert!(router.store().get("conv:1726.55").await.is_none());
    assert!(chat
        .sent
        .lock()
        .unwrap()
        .iter()
        .any(|m| m.contains("couldn't complete")));
}

// ============================================================================
// Gateway scenarios
// ============================================================================

fn gateway(h: &Harness) -> ResumptionGateway {
    ResumptionGateway::new(h.router.clone(), h.tracker.clone(), h.chat.clone())
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_unknown_tracker_event_is_ignored() {
    let h = harness(Arc::new(ScriptedOracle::new(&["END"])));
    let gw = gateway(&h);

    let outcome = gw
        .handle_ticket_event("labels_changed", "OPS-1", "bob@co", "whatever")
        .await
        .unwrap();
    assert_eq!(outcome, GatewayOutcome::Ignored);
    assert!(h.router.store().all().await.is_empty());
}

#[tokio::test]
async fn test_webhook_for_unknown_ticket_fails_without_snapshot() {
    let h = harness(Arc::new(ScriptedOracle::new(&["END"])));
    let gw = gateway(&h);

    // Tracker has no such issue, so reconstruction cannot proceed; the
    // store must stay untouched.
    let result = gw
        .handle_ticket_event("comment_created", "OPS-404", "bob@co", "approved")
        .await;
    assert!(result.is_err());
    assert!(h.router.store().all().await.is_empty());
}

#[tokio::test]
async fn test_webhook_rebuilds_workflow_from_audit_trail() {
    let h = harness(Arc::new(ScriptedOracle::new(&["END"])));
    let gw = gateway(&h);

    let approvers = BTreeSet::from(["bob@co".to_string()]);
    let description =
        audit::build_description("alice@co", "prod-db", "C1", "1726.55", &approvers);
    h.tracker
        .seed("OPS-9", &description, vec![("bob@co", "Approved")]);

    let outcome = gw
        .handle_ticket_event("comment_created", "OPS-9", "bob@co", "Approved")
        .await
        .unwrap();
    assert_eq!(outcome, GatewayOutcome::Resumed);

    // The rebuilt workflow runs to completion on its own task.
    wait_for(|| async { h.tracker.status_of("OPS-9") == "Done" }).await;
    assert_eq!(h.provisioner.applied.lock().unwrap().len(), 1);
    assert!(h.router.store().get("conv:1726.55").await.is_none());
}

#[tokio::test]
async fn test_webhook_without_audit_trail_falls_back_to_ticket_scope() {
    let h = harness(Arc::new(ScriptedOracle::new(&["END"])));
    let gw = gateway(&h);

    h.tracker.seed("OPS-9", "a hand-written description", vec![]);

    let outcome = gw
        .handle_ticket_event("comment_created", "OPS-9", "someone@co", "hello")
        .await
        .unwrap();
    assert_eq!(outcome, GatewayOutcome::Resumed);

    wait_for(|| async {
        h.router
            .store()
            .key_for_ticket("OPS-9")
            .await
            .is_some_and(|k| k == "ticket:OPS-9")
    })
    .await;
}

#[tokio::test]
async fn test_chat_mention_starts_then_resumes() {
    let h = harness(Arc::new(ScriptedOracle::new(&["END"])));
    let gw = gateway(&h);

    let first = gw
        .handle_chat_mention("C1", "1726.55", "U123", "<@UBOT> I need prod-db access")
        .await
        .unwrap();
    assert_eq!(first, GatewayOutcome::Started);

    wait_for(|| async { h.router.store().get("conv:1726.55").await.is_some() }).await;
    let record = h.router.store().get("conv:1726.55").await.unwrap();
    assert_eq!(record.resource_requested, "I need prod-db access");

    let second = gw
        .handle_chat_mention("C1", "1726.55", "U123", "<@UBOT> any update?")
        .await
        .unwrap();
    assert_eq!(second, GatewayOutcome::Resumed);
}
