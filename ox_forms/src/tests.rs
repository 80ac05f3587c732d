#[cfg(test)]
mod tests {
    use crate::captcha::{CaptchaConfig, ReCaptcha, UnavailableTokenSource};
    use crate::config::{ErrorMessages, FormsConfig};
    use crate::constraints::constraint_attributes;
    use crate::context::{FormContext, FormSource};
    use crate::decode::{add_request_context, decode, decode_definition, StaticRequest};
    use crate::dom::{Document, Element, EventKind};
    use crate::error::FormError;
    use crate::fields::render_field;
    use crate::form::{apply_form_dataset, create_form};
    use crate::http::{HttpClient, HttpResponse};
    use crate::render::{ItemAccessor, RenditionGenerator};
    use crate::repeat::instances;
    use crate::schema::{FieldDescriptor, FieldItem, FieldType, FormDefinition};
    use crate::submit::{construct_payload, handle_submit};
    use crate::traits::PageHost;
    use crate::util::{site_page_name, strip_tags, IdGenerator};
    use crate::validation::{check_validation, get_checkbox_group_value, report_validity};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn context(source: FormSource) -> Arc<FormContext> {
        FormContext::builder(Document::new())
            .form_id("test")
            .source(source)
            .build()
    }

    fn text_field(id: &str, name: &str) -> FieldDescriptor {
        FieldDescriptor::new(id, FieldType::TextInput).with_name(name)
    }

    fn control(wrapper: &Element) -> Element {
        wrapper
            .query(|e| e.is("input") || e.is("select") || e.is("textarea"))
            .expect("rendered control")
    }

    #[derive(Default)]
    struct RecordingPage {
        alerts: Mutex<Vec<String>>,
        navigations: Mutex<Vec<String>>,
    }

    impl PageHost for RecordingPage {
        fn alert(&self, message: &str) {
            self.alerts.lock().unwrap().push(message.to_string());
        }

        fn navigate(&self, url: &str) {
            self.navigations.lock().unwrap().push(url.to_string());
        }
    }

    struct StubClient {
        body: Value,
        posted: Mutex<Vec<(String, Value)>>,
    }

    impl StubClient {
        fn new(body: Value) -> Self {
            Self {
                body,
                posted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn get(&self, _url: &str) -> Result<HttpResponse, FormError> {
            Ok(HttpResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: self.body.to_string(),
            })
        }

        async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse, FormError> {
            self.posted.lock().unwrap().push((url.to_string(), body.clone()));
            Ok(HttpResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: self.body.to_string(),
            })
        }
    }

    // ---- decoding ----

    #[test]
    fn test_decode_plain_definition() {
        let value = decode(r#"{"id": "f1", "items": []}"#).unwrap();
        assert_eq!(value, json!({"id": "f1", "items": []}));
    }

    #[test]
    fn test_decode_double_encoded_definition() {
        let raw = r#""{\"id\":\"f1\",\"fieldType\":\"form\"}""#;
        let value = decode(raw).unwrap();
        assert_eq!(value, json!({"id": "f1", "fieldType": "form"}));
    }

    #[test]
    fn test_decode_strips_control_characters_and_newlines() {
        let raw = "{\n\"id\": \"f1\",\u{0001}\n\"name\": \"contact\"}";
        let value = decode(raw).unwrap();
        assert_eq!(value["name"], json!("contact"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode("{not json").unwrap_err();
        assert!(matches!(err, FormError::MalformedDefinition(_)));
    }

    #[test]
    fn test_decode_definition_keeps_malformed_children() {
        let raw = r#"{"id": "root", "fieldType": "form", "items": [
            {"id": "a", "fieldType": "text-input", "name": "a"},
            42
        ]}"#;
        let definition = decode_definition(raw).unwrap();
        let items = definition.items.as_ref().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_field().map(|f| f.id.as_str()), Some("a"));
        assert!(matches!(items[1], FieldItem::Malformed(_)));
        assert_eq!(definition.children().count(), 1);
    }

    #[test]
    fn test_unknown_field_type_survives() {
        let definition = decode_definition(r#"{"id": "x", "fieldType": "password"}"#).unwrap();
        assert_eq!(definition.kind(), FieldType::Custom("password".to_string()));
        assert_eq!(definition.kind().render_type(), "password");
    }

    #[test]
    fn test_add_request_context() {
        let mut definition = json!({"id": "f1"});
        let request = StaticRequest::new("?Campaign=spring&ref=mail", "session=abc; theme=dark");
        add_request_context(&mut definition, &request);
        assert_eq!(definition["properties"]["queryParams"]["campaign"], json!("spring"));
        assert_eq!(definition["properties"]["queryParams"]["ref"], json!("mail"));
        assert_eq!(definition["properties"]["cookies"]["session"], json!("abc"));
        assert_eq!(definition["properties"]["cookies"]["theme"], json!("dark"));
    }

    // ---- helpers ----

    #[test]
    fn test_constraint_attributes_skip_unset_values() {
        let mut fd = FieldDescriptor::new("n", FieldType::NumberInput);
        fd.maximum = Some(json!(10));
        fd.minimum = Some(json!(0));
        fd.step = Some(json!(2));
        assert_eq!(
            constraint_attributes(&fd),
            vec![("max", "10".to_string()), ("step", "2".to_string())]
        );
    }

    #[test]
    fn test_strip_tags_keeps_allowed_markup() {
        let cleaned = strip_tags("<p>Hi <script>x</script><b>there</b></p>", None);
        assert_eq!(cleaned, "<p>Hi x<b>there</b></p>");
        assert_eq!(strip_tags("<b>bold</b>", Some("")), "bold");
    }

    #[test]
    fn test_id_generator_suffixes_repeats() {
        let ids = IdGenerator::new();
        assert_eq!(ids.next("First Name"), "first-name");
        assert_eq!(ids.next("First Name"), "first-name-1");
        ids.reset();
        assert_eq!(ids.next("First Name"), "first-name");
    }

    #[test]
    fn test_site_page_name() {
        assert_eq!(
            site_page_name(Some("/content/site/contact-us/jcr:content/root/form")),
            "contact_us"
        );
        assert_eq!(site_page_name(None), "");
    }

    // ---- configuration ----

    #[test]
    fn test_release_frees_detached_subtree() {
        let doc = Document::new();
        let section = doc.create_element("fieldset");
        let input = doc.create_element("input");
        input.set_attr("name", "note");
        section.append(&input);
        doc.body().append(&section);

        let captured = Arc::new(());
        let held = captured.clone();
        input.add_listener(EventKind::Change, move |_| {
            let _ = &held;
        });
        input.focus();
        assert_eq!(Arc::strong_count(&captured), 2);

        section.release();
        assert!(!section.is_connected());
        assert!(section.children().is_empty());
        assert!(input.attr("name").is_none());
        assert!(doc.active_element().is_none());
        assert_eq!(Arc::strong_count(&captured), 1);

        // the document itself survives
        doc.body().release();
        assert!(doc.body().children().is_empty());
    }

    #[test]
    fn test_config_load_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "submit_base_url: https://forms.example.test").unwrap();
        writeln!(file, "use_worker: false").unwrap();
        writeln!(file, "error_messages:").unwrap();
        writeln!(file, "  required: Needed").unwrap();
        let config = FormsConfig::load(file.path()).unwrap();
        assert_eq!(config.submit_base_url.as_deref(), Some("https://forms.example.test"));
        assert!(!config.use_worker);
        assert_eq!(config.error_messages.required, "Needed");
        assert_eq!(config.error_messages.max_length, ErrorMessages::default().max_length);
        assert_eq!(
            config.externalize("/adobe/forms/af/data/f1"),
            "https://forms.example.test/adobe/forms/af/data/f1"
        );
    }

    #[test]
    fn test_config_load_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let err = FormsConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, FormError::Config(_)));
    }

    // ---- rendition ----

    #[tokio::test]
    async fn test_children_render_in_definition_order() {
        let ctx = context(FormSource::Aem);
        let mut panel = FieldDescriptor::new("root", FieldType::Form);
        let mut items: Vec<FieldItem> = (1..=5)
            .map(|i| FieldItem::from(text_field(&format!("f{i}"), &format!("field{i}"))))
            .collect();
        items.insert(2, FieldItem::Malformed(json!("not a field")));
        panel.items = Some(items);

        let container = ctx.document().create_element("div");
        RenditionGenerator::new(ctx.clone()).generate(&panel, &container).await;

        let ids: Vec<String> = container
            .children()
            .iter()
            .filter_map(|c| c.data("id"))
            .collect();
        assert_eq!(ids, vec!["f1", "f2", "f3", "f4", "f5"]);
    }

    #[tokio::test]
    async fn test_nested_panels_render_into_fieldsets() {
        let ctx = context(FormSource::Aem);
        let inner = FieldDescriptor::new("address", FieldType::Panel)
            .with_name("address")
            .with_label("Address")
            .with_items(vec![text_field("street", "street")]);
        let root = FieldDescriptor::new("root", FieldType::Form).with_items(vec![inner]);
        let container = ctx.document().create_element("form");
        RenditionGenerator::new(ctx.clone()).generate(&root, &container).await;

        let fieldset = container.by_id("address").unwrap();
        assert!(fieldset.is("fieldset"));
        assert!(fieldset.has_class("panel-wrapper"));
        let legend = fieldset.children().into_iter().next().unwrap();
        assert!(legend.is("legend"));
        assert_eq!(legend.text_content(), "Address");
        assert!(fieldset.by_id("street").is_some());
    }

    #[tokio::test]
    async fn test_authoring_order_follows_items_order() {
        let ctx = context(FormSource::Aem);
        let root: FieldDescriptor = serde_json::from_value(json!({
            "id": "root",
            "fieldType": "form",
            ":itemsOrder": ["second", "first"],
            ":items": {
                "first": {"id": "first", "fieldType": "text-input", "name": "first"},
                "second": {"id": "second", "fieldType": "text-input", "name": "second"}
            }
        }))
        .unwrap();
        let container = ctx.document().create_element("form");
        RenditionGenerator::new(ctx.clone())
            .with_accessor(ItemAccessor::AuthoringOrder)
            .generate(&root, &container)
            .await;
        let ids: Vec<String> = container.children().iter().filter_map(|c| c.data("id")).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_checkbox_group_renders_one_input_per_option() {
        let ctx = context(FormSource::Aem);
        let mut group = FieldDescriptor::new("cg1", FieldType::CheckboxGroup)
            .with_name("choice")
            .with_label("Choose");
        group.enum_values = Some(vec![json!("a"), json!("b")]);
        group.enum_names = Some(vec![json!("Option A"), json!("Option B")]);
        group.value = Some(json!(["a"]));
        let root = FieldDescriptor::new("root", FieldType::Form).with_items(vec![group]);
        let container = ctx.document().create_element("form");
        RenditionGenerator::new(ctx.clone()).generate(&root, &container).await;

        let boxes = container.query_all(|e| e.is("input") && e.input_type() == "checkbox");
        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(|b| b.name() == "cg1_choice"));
        assert!(boxes[0].checked());
        assert!(!boxes[1].checked());
        assert_eq!(boxes[0].data("fieldType").as_deref(), Some("checkbox-group"));
        let labels: Vec<String> = container
            .query_all(|e| e.is("label"))
            .iter()
            .map(Element::text_content)
            .collect();
        assert_eq!(labels, vec!["Option A", "Option B"]);
        assert_eq!(get_checkbox_group_value(&container, "cg1_choice"), vec!["a"]);
    }

    #[test]
    fn test_dropdown_selects_current_value() {
        let ctx = context(FormSource::Aem);
        let mut fd = FieldDescriptor::new("color", FieldType::DropDown).with_name("color");
        fd.enum_values = Some(vec![json!("r"), json!("g")]);
        fd.enum_names = Some(vec![json!("Red"), json!("Green")]);
        fd.placeholder = Some("Pick one".to_string());
        fd.value = Some(json!("g"));
        let rendered = render_field(&ctx, &fd);
        let select = control(&rendered.element);
        assert!(select.is("select"));
        assert_eq!(select.query_all(|e| e.is("option")).len(), 3);
        assert_eq!(select.value(), "g");
        assert!(rendered.remote_options.is_none());
    }

    #[tokio::test]
    async fn test_dropdown_loads_remote_options() {
        let sheet = json!({"data": [
            {"Option": "One", "Value": "1"},
            {"Option": "Two", "Value": "2"}
        ]});
        let ctx = FormContext::builder(Document::new())
            .http(Arc::new(StubClient::new(sheet)))
            .build();
        let mut fd = FieldDescriptor::new("count", FieldType::DropDown).with_name("count");
        fd.enum_values = Some(vec![json!("https://main--site--org.aem.page/options.json")]);
        let root = FieldDescriptor::new("root", FieldType::Form).with_items(vec![fd]);
        let container = ctx.document().create_element("form");
        RenditionGenerator::new(ctx.clone()).generate(&root, &container).await;

        let select = container.query(|e| e.is("select")).unwrap();
        let options: Vec<String> = select
            .query_all(|e| e.is("option"))
            .iter()
            .map(|o| o.attr("value").unwrap_or_default())
            .collect();
        assert_eq!(options, vec!["1", "2"]);
    }

    #[test]
    fn test_dual_value_input_switches_on_focus() {
        let ctx = context(FormSource::Aem);
        let mut fd = FieldDescriptor::new("dob", FieldType::DateInput).with_name("dob");
        fd.value = Some(json!("2024-01-02"));
        fd.display_value = Some(json!("Jan 2, 2024"));
        fd.display_format = Some("MMM d, y".to_string());
        let rendered = render_field(&ctx, &fd);
        let input = control(&rendered.element);
        assert_eq!(input.input_type(), "text");
        assert_eq!(input.value(), "Jan 2, 2024");

        input.focus();
        assert_eq!(input.input_type(), "date");
        assert_eq!(input.value(), "2024-01-02");

        input.blur();
        assert_eq!(input.input_type(), "text");
        assert_eq!(input.value(), "Jan 2, 2024");
    }

    #[test]
    fn test_email_inputs_carry_pattern() {
        let ctx = context(FormSource::Aem);
        let fd = FieldDescriptor::new("mail", FieldType::Email).with_name("mail");
        let input = control(&render_field(&ctx, &fd).element);
        assert_eq!(input.input_type(), "email");
        assert!(input.has_attr("pattern"));
    }

    // ---- validation ----

    #[test]
    fn test_required_message_shown_and_cleared() {
        let ctx = context(FormSource::Sheet);
        let mut fd = text_field("name1", "fullName");
        fd.required = Some(true);
        let wrapper = render_field(&ctx, &fd).element;
        let input = control(&wrapper);
        let messages = ErrorMessages::default();

        assert!(!check_validation(&input, &messages));
        assert!(wrapper.has_class("field-invalid"));
        let help = wrapper.query(|e| e.has_class("field-description")).unwrap();
        assert_eq!(help.text_content(), "Please fill in this field.");

        input.set_value("Jane");
        assert!(check_validation(&input, &messages));
        assert!(!wrapper.has_class("field-invalid"));
        assert!(wrapper.query(|e| e.has_class("field-description")).is_none());
    }

    #[test]
    fn test_invalid_message_restores_description() {
        let ctx = context(FormSource::Sheet);
        let mut fd = text_field("name1", "fullName");
        fd.required = Some(true);
        fd.description = Some("As on your passport".to_string());
        let wrapper = render_field(&ctx, &fd).element;
        let input = control(&wrapper);
        let messages = ErrorMessages::default();

        assert!(!check_validation(&input, &messages));
        input.set_value("Jane");
        assert!(check_validation(&input, &messages));
        let help = wrapper.query(|e| e.has_class("field-description")).unwrap();
        assert_eq!(help.text_content(), "As on your passport");
    }

    #[test]
    fn test_custom_constraint_message_wins() {
        let ctx = context(FormSource::Sheet);
        let mut fd = text_field("name1", "fullName");
        fd.required = Some(true);
        fd.constraint_messages
            .insert("required".to_string(), json!("We need your name"));
        let wrapper = render_field(&ctx, &fd).element;
        let input = control(&wrapper);
        assert!(!check_validation(&input, &ErrorMessages::default()));
        let help = wrapper.query(|e| e.has_class("field-description")).unwrap();
        assert_eq!(help.text_content(), "We need your name");
    }

    #[test]
    fn test_max_length_message_substitutes_limit() {
        let ctx = context(FormSource::Sheet);
        let mut fd = text_field("code", "code");
        fd.max_length = Some(json!(3));
        fd.value = Some(json!("abcd"));
        let wrapper = render_field(&ctx, &fd).element;
        let input = control(&wrapper);
        assert!(!check_validation(&input, &ErrorMessages::default()));
        let help = wrapper.query(|e| e.has_class("field-description")).unwrap();
        assert_eq!(
            help.text_content(),
            "Please shorten this text to 3 characters or less."
        );
    }

    #[test]
    fn test_report_validity_focuses_first_invalid_control() {
        let ctx = context(FormSource::Sheet);
        let doc = ctx.document();
        let form = doc.create_element("form");
        let mut first = text_field("a", "a");
        first.required = Some(true);
        let mut second = text_field("b", "b");
        second.required = Some(true);
        second.value = Some(json!("filled"));
        let first = render_field(&ctx, &first).element;
        let second = render_field(&ctx, &second).element;
        form.append_all(&[first.clone(), second.clone()]);
        crate::validation::enable_validation(&form, &ErrorMessages::default());

        assert!(!report_validity(&form));
        assert_eq!(doc.active_element(), Some(control(&first)));
        assert!(first.has_class("field-invalid"));
        assert!(!second.has_class("field-invalid"));
    }

    // ---- repeatable panels ----

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
        let mut definition =
            FormDefinition::new(FieldDescriptor::new("root", FieldType::Form).with_items(vec![panel]));
        definition.action = Some("/submit".to_string());
        definition
    }

    fn repeat_wrapper(form: &Element) -> Element {
        form.query(|e| e.has_class("repeat-wrapper")).unwrap()
    }

    fn add_button(wrapper: &Element) -> Element {
        wrapper.query(|e| e.has_class("item-add")).unwrap()
    }

    fn legend_texts(wrapper: &Element) -> Vec<String> {
        instances(wrapper)
            .iter()
            .filter_map(|i| i.children().into_iter().find(|c| c.is("legend")))
            .map(|l| l.text_content())
            .collect()
    }

    fn checkbox_names(wrapper: &Element) -> Vec<String> {
        wrapper
            .query_all(|e| e.is("input") && e.input_type() == "checkbox")
            .iter()
            .map(Element::name)
            .collect()
    }

    #[tokio::test]
    async fn test_document_repeat_add_and_remove() {
        let ctx = context(FormSource::Sheet);
        let rendered = create_form(&ctx, &repeatable_form(1, 3)).await;
        let added = Arc::new(AtomicUsize::new(0));
        let counter = added.clone();
        rendered.form.add_listener(EventKind::ItemAdd, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let wrapper = repeat_wrapper(&rendered.form);
        assert_eq!(instances(&wrapper).len(), 1);
        assert_eq!(wrapper.data("instanceCount").as_deref(), Some("1"));
        assert_eq!(wrapper.data("addInstance").as_deref(), Some("true"));
        assert_eq!(wrapper.data("removeInstance").as_deref(), Some("false"));
        assert_eq!(legend_texts(&wrapper), vec!["Item 1"]);

        add_button(&wrapper).click();
        add_button(&wrapper).click();
        assert_eq!(instances(&wrapper).len(), 3);
        assert_eq!(added.load(Ordering::SeqCst), 2);
        assert_eq!(wrapper.data("addInstance").as_deref(), Some("false"));
        assert_eq!(wrapper.data("removeInstance").as_deref(), Some("true"));
        assert_eq!(legend_texts(&wrapper), vec!["Item 1", "Item 2", "Item 3"]);
        assert_eq!(checkbox_names(&wrapper), vec!["agree", "agree-1", "agree-2"]);
        let indices: Vec<String> = instances(&wrapper)
            .iter()
            .filter_map(|i| i.data("index"))
            .collect();
        assert_eq!(indices, vec!["0", "1", "2"]);

        // at the maximum
        add_button(&wrapper).click();
        assert_eq!(instances(&wrapper).len(), 3);

        let middle = instances(&wrapper)[1].clone();
        middle.query(|e| e.has_class("item-remove")).unwrap().click();
        assert_eq!(instances(&wrapper).len(), 2);
        assert_eq!(legend_texts(&wrapper), vec!["Item 1", "Item 2"]);
        assert_eq!(checkbox_names(&wrapper), vec!["agree", "agree-1"]);
        assert_eq!(wrapper.data("instanceCount").as_deref(), Some("2"));

        let actions = wrapper.children().into_iter().last().unwrap();
        assert!(actions.has_class("repeat-actions"));
    }

    #[tokio::test]
    async fn test_document_repeat_respects_minimum() {
        let ctx = context(FormSource::Sheet);
        let rendered = create_form(&ctx, &repeatable_form(1, 3)).await;
        let wrapper = repeat_wrapper(&rendered.form);
        add_button(&wrapper).click();
        assert_eq!(instances(&wrapper).len(), 2);

        let first = instances(&wrapper)[0].clone();
        first.query(|e| e.has_class("item-remove")).unwrap().click();
        assert_eq!(instances(&wrapper).len(), 1);
        let last = instances(&wrapper)[0].clone();
        last.query(|e| e.has_class("item-remove")).unwrap().click();
        assert_eq!(instances(&wrapper).len(), 1);
        assert_eq!(wrapper.data("removeInstance").as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn test_repeat_with_zero_minimum_starts_empty() {
        let ctx = context(FormSource::Sheet);
        let rendered = create_form(&ctx, &repeatable_form(0, 2)).await;
        let wrapper = repeat_wrapper(&rendered.form);
        assert!(instances(&wrapper).is_empty());
        assert_eq!(wrapper.data("instanceCount").as_deref(), Some("0"));

        add_button(&wrapper).click();
        assert_eq!(instances(&wrapper).len(), 1);
        assert_eq!(legend_texts(&wrapper), vec!["Item 1"]);
        assert_eq!(wrapper.data("removeInstance").as_deref(), Some("true"));
    }

    // ---- form assembly ----

    #[tokio::test]
    async fn test_create_form_sets_dataset() {
        let ctx = context(FormSource::Sheet);
        let rendered = create_form(&ctx, &repeatable_form(1, 1)).await;
        assert!(rendered.form.is("form"));
        assert_eq!(rendered.form.data("action").as_deref(), Some("/submit"));
        assert_eq!(rendered.form.data("source").as_deref(), Some("sheet"));
        assert_eq!(rendered.form.data("id").as_deref(), Some("root"));
        assert!(rendered.form.has_attr("novalidate"));
        assert!(rendered.captcha.is_none());
        assert_eq!(rendered.repeat_groups.len(), 1);
    }

    #[test]
    fn test_apply_form_dataset_falls_back_to_pathname() {
        let doc = Document::new();
        let form = doc.create_element("form");
        let mut definition = FormDefinition::new(FieldDescriptor::new("root", FieldType::Form));
        definition.thank_you_msg = Some("Thanks".to_string());
        definition
            .root
            .properties
            .insert("fd:path".to_string(), json!("/content/forms/contact/jcr:content/root"));
        apply_form_dataset(&form, &definition, FormSource::Aem, true, Some("/forms/contact.json"));
        assert_eq!(form.data("action").as_deref(), Some("/forms/contact"));
        assert_eq!(form.data("thankYouMsg").as_deref(), Some("Thanks"));
        assert_eq!(form.data("rules").as_deref(), Some("true"));
        assert_eq!(
            form.data("formpath").as_deref(),
            Some("/content/forms/contact/jcr:content/root")
        );
    }

    // ---- captcha ----

    #[test]
    fn test_captcha_config_from_properties() {
        let mut field = FieldDescriptor::new("captcha", FieldType::Captcha).with_name("captcha");
        field.properties.insert(
            "fd:captcha".to_string(),
            json!({"config": {"siteKey": "key-1", "uri": "https://captcha.example.test/enterprise.js", "version": "enterprise"}}),
        );
        field
            .properties
            .insert("fd:path".to_string(), json!("/content/site/sign-up/jcr:content/root"));
        let config = CaptchaConfig::from_field(&field);
        assert_eq!(config.site_key.as_deref(), Some("key-1"));
        assert!(config.is_enterprise());

        let captcha = ReCaptcha::new(&field, Arc::new(UnavailableTokenSource));
        assert_eq!(captcha.submit_action(), "submit_sign_up_captcha");
    }

    #[tokio::test]
    async fn test_captcha_without_submit_button_alerts() {
        let doc = Document::new();
        let form = doc.create_element("form");
        let mut field = FieldDescriptor::new("captcha", FieldType::Captcha);
        field.value = Some(json!("site-key"));
        let captcha = ReCaptcha::new(&field, Arc::new(UnavailableTokenSource));
        let page = RecordingPage::default();
        assert!(captcha.load_captcha(&form, &page).is_err());
        assert_eq!(page.alerts.lock().unwrap().len(), 1);
        assert!(captcha.script_url().is_none());

        let submit = doc.create_element("button");
        submit.set_attr("type", "submit");
        form.append(&submit);
        assert!(captcha.load_captcha(&form, &page).is_ok());
        assert_eq!(
            captcha.script_url().as_deref(),
            Some("https://www.google.com/recaptcha/api.js?render=site-key")
        );
        assert_eq!(captcha.get_token().await, None);
    }

    // ---- submission ----

    #[test]
    fn test_construct_payload_joins_checkboxes() {
        let doc = Document::new();
        let form = doc.create_element("form");
        let text = doc.create_element("input");
        text.set_attr("name", "first");
        text.set_value("Ada");
        let disabled = doc.create_element("input");
        disabled.set_attr("name", "hidden");
        disabled.set_disabled(true);
        form.append_all(&[text, disabled]);
        for value in ["a", "b", "c"] {
            let checkbox = doc.create_element("input");
            checkbox.set_attr("type", "checkbox");
            checkbox.set_attr("name", "pick");
            checkbox.set_value(value);
            checkbox.set_checked(value != "b");
            form.append(&checkbox);
        }
        let payload = construct_payload(&form);
        assert_eq!(payload["first"], json!("Ada"));
        assert_eq!(payload["pick"], json!("a,c"));
        assert!(!payload.contains_key("hidden"));
        assert!(payload.contains_key("__id__"));
    }

    #[tokio::test]
    async fn test_handle_submit_posts_and_thanks() {
        let client = Arc::new(StubClient::new(json!({"thankYouMessage": "Got it"})));
        let ctx = FormContext::builder(Document::new())
            .source(FormSource::Sheet)
            .http(client.clone())
            .build();
        let mut name = text_field("name", "name");
        name.value = Some(json!("Ada"));
        let mut definition =
            FormDefinition::new(FieldDescriptor::new("root", FieldType::Form).with_items(vec![name]));
        definition.action = Some("https://submit.example.test/form".to_string());
        let rendered = create_form(&ctx, &definition).await;
        ctx.document().body().append(&rendered.form);
        let reset = Arc::new(AtomicUsize::new(0));
        let counter = reset.clone();
        rendered.form.add_listener(EventKind::Reset, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle_submit(&ctx, &rendered.form, None).await);
        let posted = client.posted.lock().unwrap().clone();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, "https://submit.example.test/form");
        assert_eq!(posted[0].1["data"]["name"], json!("Ada"));

        let message = ctx
            .document()
            .body()
            .query(|e| e.has_class("success-message"))
            .unwrap();
        assert_eq!(message.text_content(), "Got it");
        assert_eq!(reset.load(Ordering::SeqCst), 1);
        assert_eq!(rendered.form.attr("data-submitting").as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn test_handle_submit_blocks_invalid_form() {
        let client = Arc::new(StubClient::new(json!({})));
        let ctx = FormContext::builder(Document::new())
            .source(FormSource::Sheet)
            .http(client.clone())
            .build();
        let mut name = text_field("name", "name");
        name.required = Some(true);
        let definition =
            FormDefinition::new(FieldDescriptor::new("root", FieldType::Form).with_items(vec![name]));
        let rendered = create_form(&ctx, &definition).await;
        assert!(!handle_submit(&ctx, &rendered.form, None).await);
        assert!(client.posted.lock().unwrap().is_empty());
    }
}
