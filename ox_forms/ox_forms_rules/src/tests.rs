#[cfg(test)]
mod tests {
    use crate::bridge::within;
    use crate::dispatch::{plan_mutation, DomMutation};
    use crate::error::BridgeError;
    use crate::host::{ChannelHost, InProcessHost, WorkerHost};
    use crate::lifecycle::{Lifecycle, LifecycleState};
    use crate::prefill::{extract_prefill, fetch_prefill};
    use crate::runtime::{FormRuntime, FormRuntimeFactory};
    use crate::worker::{FromWorker, InitPayload, RuleEngineWorker, ToWorker};
    use async_trait::async_trait;
    use ox_forms::config::FormsConfig;
    use ox_forms::error::FormError;
    use ox_forms::http::{HttpClient, HttpResponse, OfflineClient};
    use ox_forms::model::{Action, Change, FieldModelRuntime, ModelError, ModelEvent, Property};
    use ox_forms::schema::{FieldDescriptor, FieldType, FormDefinition, Label, Validity};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn text_field(id: &str, name: &str) -> FieldDescriptor {
        FieldDescriptor::new(id, FieldType::TextInput).with_name(name)
    }

    fn contact_form() -> FormDefinition {
        let mut name = text_field("name", "name");
        name.required = Some(true);
        let email = FieldDescriptor::new("email", FieldType::Email).with_name("email");
        let address = FieldDescriptor::new("address", FieldType::Panel)
            .with_name("address")
            .with_items(vec![text_field("city", "city")]);
        let mut submit = FieldDescriptor::new("submit", FieldType::Button)
            .with_name("submit")
            .with_label("Submit");
        submit.button_type = Some("submit".to_string());
        let mut definition = FormDefinition::new(
            FieldDescriptor::new("contact", FieldType::Form).with_items(vec![name, email, address, submit]),
        );
        definition.action = Some("/submit".to_string());
        definition.thank_you_msg = Some("Thanks!".to_string());
        definition
    }

    fn repeatable_form(min: i64, max: i64) -> FormDefinition {
        let mut agree = FieldDescriptor::new("agree", FieldType::Checkbox)
            .with_name("agree")
            .with_label("Agree");
        agree.enum_values = Some(vec![json!("yes")]);
        let mut panel = FieldDescriptor::new("p1", FieldType::Panel)
            .with_name("items")
            .with_label("Item #")
            .with_items(vec![agree]);
        panel.repeatable = Some(true);
        panel.min_occur = Some(json!(min));
        panel.max_occur = Some(json!(max));
        FormDefinition::new(FieldDescriptor::new("root", FieldType::Form).with_items(vec![panel]))
    }

    fn drain(events: &mut UnboundedReceiver<ModelEvent>) -> Vec<ModelEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    fn instance_ids(runtime: &FormRuntime, manager: &str) -> Vec<String> {
        runtime
            .field_state(manager)
            .unwrap()
            .children()
            .filter(|c| c.is_repeatable())
            .map(|c| c.id.clone())
            .collect()
    }

    struct StubClient {
        status: u16,
        body: Value,
        requested: Mutex<Vec<String>>,
    }

    impl StubClient {
        fn new(status: u16, body: Value) -> Self {
            Self {
                status,
                body,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn get(&self, url: &str) -> Result<HttpResponse, FormError> {
            self.requested.lock().unwrap().push(url.to_string());
            Ok(HttpResponse {
                status: self.status,
                content_type: Some("application/json".to_string()),
                body: self.body.to_string(),
            })
        }
    }

    fn worker_with(http: Arc<dyn HttpClient>) -> RuleEngineWorker {
        RuleEngineWorker::new(Arc::new(FormRuntimeFactory), http, Arc::new(FormsConfig::default()))
    }

    fn init_message(definition: FormDefinition, search: &str) -> ToWorker {
        ToWorker::Init(Box::new(InitPayload {
            definition,
            search: search.to_string(),
        }))
    }

    // ---- qualified name matching ----

    #[test]
    fn test_within_respects_name_boundaries() {
        assert!(within("$form.items[1].agree", "$form.items[1]"));
        assert!(within("$form.items[1]", "$form.items[1]"));
        assert!(within("$form.address.city", "$form.address"));
        assert!(!within("$form.items[10]", "$form.items[1]"));
        assert!(!within("$form.addressLine", "$form.address"));
    }

    // ---- lifecycle ----

    #[test]
    fn test_lifecycle_follows_handshake_order() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
        lifecycle.transition(LifecycleState::Initializing).unwrap();
        lifecycle.transition(LifecycleState::Restoring).unwrap();
        lifecycle.transition(LifecycleState::Ready).unwrap();
        lifecycle.transition(LifecycleState::Submitting).unwrap();
        lifecycle.transition(LifecycleState::SubmitFailure).unwrap();
        lifecycle.transition(LifecycleState::Submitting).unwrap();
        lifecycle.transition(LifecycleState::SubmitSuccess).unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::SubmitSuccess);
    }

    #[test]
    fn test_lifecycle_rejects_skipped_phases() {
        let lifecycle = Lifecycle::new();
        let err = lifecycle.transition(LifecycleState::Ready).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Lifecycle {
                from: LifecycleState::Uninitialized,
                to: LifecycleState::Ready
            }
        ));
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
    }

    #[test]
    fn test_disposed_is_terminal() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleState::Initializing).unwrap();
        lifecycle.transition(LifecycleState::Disposed).unwrap();
        assert!(lifecycle.is_disposed());
        assert!(lifecycle.transition(LifecycleState::Initializing).is_err());
        assert!(lifecycle.transition(LifecycleState::Disposed).is_err());
    }

    // ---- field model ----

    #[test]
    fn test_runtime_assigns_qualified_names() {
        let runtime = FormRuntime::new(contact_form());
        let root = runtime.field_state("contact").unwrap();
        assert_eq!(root.qualified_name.as_deref(), Some("$form"));
        let city = runtime.field_state("city").unwrap();
        assert_eq!(city.qualified_name.as_deref(), Some("$form.address.city"));
        assert_eq!(runtime.root_id(), "contact");
    }

    #[test]
    fn test_runtime_names_repeat_instances_with_index() {
        let runtime = FormRuntime::new(repeatable_form(2, 4));
        assert!(runtime.is_instance_manager("root"));
        assert_eq!(instance_ids(&runtime, "root"), vec!["p1", "p1-1"]);
        let second = runtime.field_state("p1-1").unwrap();
        assert_eq!(second.qualified_name.as_deref(), Some("$form.items[1]"));
        assert_eq!(second.index, Some(1));
        let nested = runtime.field_state("agree-1").unwrap();
        assert_eq!(nested.qualified_name.as_deref(), Some("$form.items[1].agree"));
    }

    #[test]
    fn test_restored_runtime_keeps_instances() {
        let state = FormRuntime::new(repeatable_form(0, 3)).get_state();
        let restored = FormRuntime::from_state(state.clone());
        assert_eq!(restored.get_state(), state);
        assert_eq!(instance_ids(&restored, "root"), vec!["p1"]);
    }

    #[test]
    fn test_set_value_emits_only_real_changes() {
        let runtime = FormRuntime::new(contact_form());
        let mut events = runtime.subscribe();
        runtime.set_value("email", json!("ada@example.com")).unwrap();
        runtime.set_value("email", json!("ada@example.com")).unwrap();
        let drained = drain(&mut events);
        assert_eq!(drained.len(), 1);
        let ModelEvent::FieldChanged(payload) = &drained[0] else {
            panic!("expected a field change, got {:?}", drained[0]);
        };
        assert_eq!(payload.field.id, "email");
        assert_eq!(
            payload.changes,
            vec![Change::new(Property::Value, json!("ada@example.com"), Value::Null)]
        );
    }

    #[test]
    fn test_required_field_reports_validity() {
        let runtime = FormRuntime::new(contact_form());
        let mut events = runtime.subscribe();
        runtime.set_value("name", json!("Ada")).unwrap();
        runtime.set_value("name", json!("")).unwrap();
        let drained = drain(&mut events);
        let ModelEvent::FieldChanged(first) = &drained[0] else {
            panic!("expected a field change");
        };
        assert!(first
            .changes
            .contains(&Change::new(Property::Valid, json!(true), Value::Null)));
        let ModelEvent::FieldChanged(second) = &drained[1] else {
            panic!("expected a field change");
        };
        assert!(second
            .changes
            .contains(&Change::new(Property::Valid, json!(false), json!(true))));
        assert_eq!(runtime.field_state("name").unwrap().valid, Some(false));
    }

    #[test]
    fn test_set_value_rejects_containers_and_unknown_fields() {
        let runtime = FormRuntime::new(contact_form());
        assert!(matches!(
            runtime.set_value("address", json!("x")),
            Err(ModelError::InvalidValue { .. })
        ));
        assert_eq!(
            runtime.set_value("nope", json!("x")),
            Err(ModelError::UnknownField("nope".to_string()))
        );
        assert_eq!(
            runtime.dispatch("nope", Action::Focus),
            Err(ModelError::UnknownField("nope".to_string()))
        );
    }

    #[test]
    fn test_set_property_updates_label() {
        let runtime = FormRuntime::new(contact_form());
        let mut events = runtime.subscribe();
        runtime
            .set_property("email", &Property::Label, json!({"value": "E-mail"}))
            .unwrap();
        assert_eq!(runtime.field_state("email").unwrap().label_text(), Some("E-mail"));
        let drained = drain(&mut events);
        let ModelEvent::FieldChanged(payload) = &drained[0] else {
            panic!("expected a field change");
        };
        assert_eq!(payload.changes[0].property_name, Property::Label);
        assert_eq!(payload.changes[0].prev_value, Value::Null);

        runtime.set_property("address", &Property::Visible, json!(false)).unwrap();
        assert_eq!(runtime.field_state("address").unwrap().visible, Some(false));
        assert!(runtime
            .set_property("address", &Property::Items, json!([]))
            .is_err());
    }

    #[test]
    fn test_focus_moves_active_child_once() {
        let runtime = FormRuntime::new(contact_form());
        let mut events = runtime.subscribe();
        runtime.dispatch("email", Action::Focus).unwrap();
        runtime.dispatch("email", Action::Focus).unwrap();
        let drained = drain(&mut events);
        assert_eq!(drained.len(), 1);
        let ModelEvent::Change(payload) = &drained[0] else {
            panic!("expected a form change");
        };
        assert_eq!(payload.field.id, "contact");
        assert_eq!(
            payload.changes,
            vec![Change::new(Property::ActiveChild, json!({"id": "email"}), Value::Null)]
        );
    }

    #[test]
    fn test_submit_with_missing_required_field_fails() {
        let runtime = FormRuntime::new(contact_form());
        let mut events = runtime.subscribe();
        runtime.dispatch("submit", Action::Click).unwrap();
        let drained = drain(&mut events);
        assert_eq!(drained.len(), 2);
        let ModelEvent::FieldChanged(payload) = &drained[0] else {
            panic!("expected the missing field to be flagged");
        };
        assert_eq!(payload.field.id, "name");
        assert_eq!(payload.field.valid, Some(false));
        assert!(payload.touches(&Property::ValidationMessage));
        assert_eq!(drained[1], ModelEvent::SubmitFailure(json!({"invalid": ["name"]})));
    }

    #[test]
    fn test_submit_success_carries_data_and_message() {
        let runtime = FormRuntime::new(contact_form());
        runtime.set_value("name", json!("Ada")).unwrap();
        runtime.set_value("city", json!("London")).unwrap();
        let mut events = runtime.subscribe();
        runtime.dispatch("contact", Action::Submit).unwrap();
        let drained = drain(&mut events);
        let ModelEvent::SubmitSuccess(body) = &drained[0] else {
            panic!("expected success, got {:?}", drained[0]);
        };
        assert_eq!(body["data"]["name"], json!("Ada"));
        assert_eq!(body["data"]["address"], json!({"city": "London"}));
        assert_eq!(body["thankYouMessage"], json!("Thanks!"));
        assert!(body["data"].get("submit").is_none());
    }

    #[test]
    fn test_plain_button_click_does_not_submit() {
        let mut definition = contact_form();
        let reset = FieldDescriptor::new("clear", FieldType::Button).with_label("Clear");
        if let Some(items) = definition.root.items.as_mut() {
            items.push(reset.into());
        }
        let runtime = FormRuntime::new(definition);
        let mut events = runtime.subscribe();
        runtime.dispatch("clear", Action::Click).unwrap();
        assert!(drain(&mut events).is_empty());
    }

    #[test]
    fn test_add_instance_emits_new_instance() {
        let runtime = FormRuntime::new(repeatable_form(1, 3));
        let mut events = runtime.subscribe();
        runtime.dispatch("root", Action::AddInstance(1)).unwrap();
        let drained = drain(&mut events);
        let ModelEvent::FieldChanged(payload) = &drained[0] else {
            panic!("expected an items change");
        };
        assert_eq!(payload.field.id, "root");
        let change = &payload.changes[0];
        assert_eq!(change.property_name, Property::Items);
        assert_eq!(change.prev_value, Value::Null);
        assert_eq!(change.current_value["id"], json!("p1-1"));
        assert_eq!(change.current_value["qualifiedName"], json!("$form.items[1]"));
        assert_eq!(change.current_value["index"], json!(1));
        assert!(runtime.field_state("agree-1").is_some());
    }

    #[test]
    fn test_add_instance_stops_at_max() {
        let runtime = FormRuntime::new(repeatable_form(1, 2));
        runtime.dispatch("root", Action::AddInstance(1)).unwrap();
        let err = runtime.dispatch("root", Action::AddInstance(2)).unwrap_err();
        assert!(matches!(err, ModelError::NotApplicable { .. }));
        assert_eq!(instance_ids(&runtime, "root").len(), 2);
    }

    #[test]
    fn test_zero_max_is_unbounded() {
        let runtime = FormRuntime::new(repeatable_form(0, 0));
        for index in 1..6 {
            runtime.dispatch("root", Action::AddInstance(index)).unwrap();
        }
        assert_eq!(instance_ids(&runtime, "root").len(), 6);
    }

    #[test]
    fn test_remove_instance_respects_min_and_reindexes() {
        let runtime = FormRuntime::new(repeatable_form(1, 3));
        runtime.dispatch("root", Action::AddInstance(1)).unwrap();
        let mut events = runtime.subscribe();
        runtime.dispatch("root", Action::RemoveInstance(0)).unwrap();
        let drained = drain(&mut events);
        let ModelEvent::FieldChanged(payload) = &drained[0] else {
            panic!("expected an items change");
        };
        assert_eq!(payload.changes[0].current_value, Value::Null);
        assert_eq!(payload.changes[0].prev_value["id"], json!("p1"));
        assert_eq!(instance_ids(&runtime, "root"), vec!["p1-1"]);
        let remaining = runtime.field_state("p1-1").unwrap();
        assert_eq!(remaining.qualified_name.as_deref(), Some("$form.items[0]"));

        let err = runtime.dispatch("root", Action::RemoveInstance(0)).unwrap_err();
        assert!(matches!(err, ModelError::NotApplicable { .. }));
    }

    #[test]
    fn test_instance_actions_need_a_manager() {
        let runtime = FormRuntime::new(contact_form());
        assert!(matches!(
            runtime.dispatch("address", Action::AddInstance(0)),
            Err(ModelError::NotApplicable { .. })
        ));
    }

    #[test]
    fn test_import_grows_repeatables_and_exports_back() {
        let runtime = FormRuntime::new(repeatable_form(1, 5));
        runtime.import_data(&json!({"items": [{"agree": "yes"}, {"agree": "no"}, {}]}));
        assert_eq!(instance_ids(&runtime, "root").len(), 3);
        assert_eq!(runtime.field_state("agree").unwrap().value, Some(json!("yes")));
        assert_eq!(runtime.field_state("agree-1").unwrap().value, Some(json!("no")));
        assert_eq!(
            runtime.export_data(),
            json!({"items": [{"agree": "yes"}, {"agree": "no"}, {"agree": null}]})
        );
    }

    #[test]
    fn test_import_fills_nested_panels() {
        let runtime = FormRuntime::new(contact_form());
        runtime.import_data(&json!({"name": "Ada", "address": {"city": "Paris"}, "unknown": 1}));
        assert_eq!(runtime.field_state("city").unwrap().value, Some(json!("Paris")));
        assert_eq!(
            runtime.export_data(),
            json!({"name": "Ada", "email": null, "address": {"city": "Paris"}})
        );
    }

    // ---- change planning ----

    fn change(property: Property, current: Value) -> Change {
        Change::new(property, current, Value::Null)
    }

    #[test]
    fn test_plan_mutation_maps_simple_properties() {
        let field = text_field("f", "f");
        assert_eq!(
            plan_mutation(&field, &change(Property::Required, json!(true))),
            Some(DomMutation::SetRequired(true))
        );
        assert_eq!(
            plan_mutation(&field, &change(Property::Visible, json!(false))),
            Some(DomMutation::SetVisible(false))
        );
        assert_eq!(
            plan_mutation(&field, &change(Property::Value, json!("x"))),
            Some(DomMutation::SetValue(json!("x")))
        );
        assert_eq!(
            plan_mutation(&field, &change(Property::Label, json!("Hello"))),
            Some(DomMutation::SetLabel(Label::new("Hello")))
        );
        assert_eq!(
            plan_mutation(&field, &change(Property::ActiveChild, json!({"id": "email"}))),
            Some(DomMutation::ActivateChild("email".to_string()))
        );
        assert_eq!(
            plan_mutation(&field, &change(Property::Other("foo".to_string()), json!(1))),
            None
        );
    }

    #[test]
    fn test_plan_mutation_only_shows_custom_messages() {
        let mut field = text_field("f", "f");
        let message = change(Property::ValidationMessage, json!("Too short"));
        assert_eq!(plan_mutation(&field, &message), None);
        field.validity = Some(Validity {
            custom_constraint: true,
            ..Default::default()
        });
        assert_eq!(
            plan_mutation(&field, &message),
            Some(DomMutation::ShowValidationMessage("Too short".to_string()))
        );
    }

    #[test]
    fn test_plan_mutation_clears_only_on_valid() {
        let field = text_field("f", "f");
        assert_eq!(
            plan_mutation(&field, &change(Property::Valid, json!(true))),
            Some(DomMutation::ClearInvalid)
        );
        assert_eq!(plan_mutation(&field, &change(Property::Valid, json!(false))), None);
    }

    #[test]
    fn test_plan_mutation_distinguishes_instance_add_and_remove() {
        let field = FieldDescriptor::new("root", FieldType::Form);
        let removed = Change::new(Property::Items, Value::Null, json!({"id": "p1-1"}));
        assert_eq!(
            plan_mutation(&field, &removed),
            Some(DomMutation::RemoveInstance("p1-1".to_string()))
        );
        let added = change(Property::Items, json!({"id": "p1-2", "fieldType": "panel"}));
        let Some(DomMutation::RenderInstance(instance)) = plan_mutation(&field, &added) else {
            panic!("expected an instance to render");
        };
        assert_eq!(instance.id, "p1-2");
        assert_eq!(instance.kind(), FieldType::Panel);
    }

    // ---- prefill ----

    #[test]
    fn test_extract_prefill_prefers_bound_data() {
        let json = json!({"data": {"afData": {"afBoundData": {"data": {"name": "Ada"}}}}});
        assert_eq!(extract_prefill(json), Some(json!({"name": "Ada"})));
    }

    #[test]
    fn test_extract_prefill_falls_back_to_data_then_document() {
        assert_eq!(
            extract_prefill(json!({"data": {"name": "Ada"}})),
            Some(json!({"name": "Ada"}))
        );
        assert_eq!(
            extract_prefill(json!({"name": "Ada"})),
            Some(json!({"name": "Ada"}))
        );
        assert_eq!(extract_prefill(Value::Null), None);
    }

    #[tokio::test]
    async fn test_fetch_prefill_builds_data_url() {
        let http = StubClient::new(200, json!({"data": {"name": "Ada"}}));
        let data = fetch_prefill(&http, &FormsConfig::default(), "contact", "?ref=mail").await;
        assert_eq!(data, Some(json!({"name": "Ada"})));
        assert_eq!(
            http.requested.lock().unwrap().as_slice(),
            ["/adobe/forms/af/data/contact?ref=mail"]
        );
    }

    #[tokio::test]
    async fn test_fetch_prefill_ignores_failures() {
        let failing = StubClient::new(500, json!({"error": "boom"}));
        assert_eq!(fetch_prefill(&failing, &FormsConfig::default(), "contact", "").await, None);
        assert_eq!(fetch_prefill(&OfflineClient, &FormsConfig::default(), "contact", "").await, None);
    }

    // ---- worker protocol ----

    #[test]
    fn test_worker_messages_use_wire_names() {
        assert_eq!(serde_json::to_value(ToWorker::Decorated).unwrap(), json!({"name": "decorated"}));
        assert_eq!(
            serde_json::to_value(FromWorker::SyncComplete).unwrap(),
            json!({"name": "sync-complete"})
        );
        let message: ToWorker = serde_json::from_value(json!({
            "name": "init",
            "payload": {"id": "f", "fieldType": "form", "search": "?a=1"}
        }))
        .unwrap();
        let ToWorker::Init(payload) = message else {
            panic!("expected init");
        };
        assert_eq!(payload.definition.id, "f");
        assert_eq!(payload.search, "?a=1");
    }

    #[tokio::test]
    async fn test_worker_rejects_decorated_before_init() {
        let mut worker = worker_with(Arc::new(OfflineClient));
        let err = worker.handle(ToWorker::Decorated).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Protocol { ref expected, ref got } if expected == "init" && got == "decorated"
        ));
        let replies = worker.handle(init_message(contact_form(), "")).await.unwrap();
        assert!(matches!(replies.as_slice(), [FromWorker::Init(_)]));
    }

    #[tokio::test]
    async fn test_worker_rejects_second_init() {
        let mut worker = worker_with(Arc::new(OfflineClient));
        worker.handle(init_message(contact_form(), "")).await.unwrap();
        let err = worker.handle(init_message(contact_form(), "")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { ref expected, .. } if expected == "decorated"));
        let replies = worker.handle(ToWorker::Decorated).await.unwrap();
        assert!(matches!(replies.last(), Some(FromWorker::SyncComplete)));
    }

    #[tokio::test]
    async fn test_worker_restores_prefilled_state() {
        let http = Arc::new(StubClient::new(
            200,
            json!({"data": {"afData": {"afBoundData": {"data": {"name": "Ada"}}}}}),
        ));
        let mut worker = worker_with(http);
        let replies = worker.handle(init_message(contact_form(), "")).await.unwrap();
        let [FromWorker::Init(initial)] = replies.as_slice() else {
            panic!("expected init reply");
        };
        assert_eq!(initial.root.qualified_name.as_deref(), Some("$form"));

        let replies = worker.handle(ToWorker::Decorated).await.unwrap();
        let names: Vec<&str> = replies.iter().map(FromWorker::name).collect();
        assert_eq!(names, vec!["restore", "fieldChanged", "sync-complete"]);
        let FromWorker::Restore(state) = &replies[0] else {
            panic!("expected restore first");
        };
        let name = state.children().find(|c| c.id == "name").unwrap();
        assert_eq!(name.value, Some(json!("Ada")));
        let FromWorker::FieldChanged(payload) = &replies[1] else {
            panic!("expected the prefilled field");
        };
        assert_eq!(payload.field.id, "name");
    }

    #[tokio::test]
    async fn test_worker_without_prefill_reports_no_changes() {
        let mut worker = worker_with(Arc::new(StubClient::new(500, Value::Null)));
        worker.handle(init_message(contact_form(), "")).await.unwrap();
        let replies = worker.handle(ToWorker::Decorated).await.unwrap();
        let names: Vec<&str> = replies.iter().map(FromWorker::name).collect();
        assert_eq!(names, vec!["restore", "sync-complete"]);
    }

    async fn handshake(host: &mut dyn WorkerHost) -> Vec<&'static str> {
        host.send(init_message(repeatable_form(2, 3), "")).await.unwrap();
        let mut names = vec![host.next_message().await.unwrap().name()];
        host.send(ToWorker::Decorated).await.unwrap();
        loop {
            let message = host.next_message().await.unwrap();
            names.push(message.name());
            if message == FromWorker::SyncComplete {
                break;
            }
        }
        names
    }

    #[tokio::test]
    async fn test_in_process_host_runs_handshake() {
        let mut host = InProcessHost::new(worker_with(Arc::new(OfflineClient)));
        assert_eq!(handshake(&mut host).await, vec!["init", "restore", "sync-complete"]);
        assert!(matches!(
            host.next_message().await,
            Err(BridgeError::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn test_channel_host_runs_handshake() {
        let mut host = ChannelHost::spawn(worker_with(Arc::new(OfflineClient)));
        assert_eq!(handshake(&mut host).await, vec!["init", "restore", "sync-complete"]);
    }

    #[tokio::test]
    async fn test_channel_host_reports_protocol_errors() {
        let mut host = ChannelHost::spawn(worker_with(Arc::new(OfflineClient)));
        host.send(ToWorker::Decorated).await.unwrap();
        let err = host.next_message().await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
    }
}
