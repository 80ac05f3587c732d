use async_trait::async_trait;
use ox_adaptive_forms::{decorate, DecoratedForm, PageLocation};
use ox_forms::context::FormContext;
use ox_forms::dom::{el, Document, Element, EventKind};
use ox_forms::http::{HttpClient, HttpResponse, OfflineClient};
use ox_forms::{FormError, FormsConfig};
use ox_forms_rules::{FormRuntimeFactory, LifecycleState};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

struct StubClient {
    content_type: String,
    body: String,
    requested: Mutex<Vec<String>>,
    posted: Mutex<Vec<(String, Value)>>,
}

impl StubClient {
    fn new(content_type: &str, body: impl ToString) -> Arc<Self> {
        Arc::new(Self {
            content_type: content_type.to_string(),
            body: body.to_string(),
            requested: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HttpClient for StubClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FormError> {
        self.requested.lock().unwrap().push(url.to_string());
        Ok(HttpResponse {
            status: 200,
            content_type: Some(self.content_type.clone()),
            body: self.body.clone(),
        })
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse, FormError> {
        self.posted.lock().unwrap().push((url.to_string(), body.clone()));
        Ok(HttpResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: json!({"thankYouMessage": "Got it"}).to_string(),
        })
    }
}

fn base(http: Arc<dyn HttpClient>, config: FormsConfig) -> Arc<FormContext> {
    FormContext::builder(Document::new())
        .http(http)
        .config(Arc::new(config))
        .build()
}

fn location() -> PageLocation {
    PageLocation {
        origin: Some("https://site.example.test".to_string()),
        ..PageLocation::new("/content/site/contact")
    }
}

fn embedded_block(ctx: &FormContext, definition: &str) -> (Element, Element) {
    let doc = ctx.document();
    let block = el(doc, "div").class("form").build();
    let pre = doc.create_element("pre");
    pre.append(&el(doc, "code").text(definition).build());
    block.append(&pre);
    doc.body().append(&block);
    (block, pre)
}

fn linked_block(ctx: &FormContext, href: &str) -> (Element, Element) {
    let doc = ctx.document();
    let block = el(doc, "div").class("form").build();
    let anchor = el(doc, "a").attr("href", href).text("Contact form").build();
    block.append(&anchor);
    doc.body().append(&block);
    (block, anchor)
}

fn adaptive_definition() -> String {
    json!({
        "id": "contact",
        "fieldType": "form",
        "action": "/adobe/forms/af/submit/contact",
        "thankYouMsg": "Thanks!",
        "properties": {"fd:path": "/content/forms/contact/jcr:content/root/form"},
        "items": [
            {"id": "name", "name": "name", "fieldType": "text-input", "label": {"value": "Name"}},
            {"id": "submit", "name": "submit", "fieldType": "button", "buttonType": "submit", "label": {"value": "Send"}}
        ]
    })
    .to_string()
}

fn contact_sheet() -> Value {
    json!({
        ":type": "sheet",
        "total": 2,
        "properties": {"actionType": "spreadsheet", "spreadsheetUrl": "https://sheets.example.test/contact"},
        "data": [
            {"Name": "name", "Type": "text", "Label": "Name", "Value": "Ada"},
            {"Name": "submit", "Type": "submit", "Label": "Send"}
        ]
    })
}

async fn settle(done: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if done() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    done()
}

fn forms(ctx: &FormContext) -> Vec<Element> {
    ctx.document().body().query_all(|e| e.is("form"))
}

#[tokio::test]
async fn test_embedded_definition_becomes_adaptive_form() {
    let config = FormsConfig {
        submit_base_url: Some("https://author.example.test".to_string()),
        ..Default::default()
    };
    let ctx = base(Arc::new(OfflineClient), config);
    let (block, pre) = embedded_block(&ctx, &adaptive_definition());

    let decorated = decorate(&block, &ctx, &location(), Arc::new(FormRuntimeFactory))
        .await
        .expect("form decorated");
    let DecoratedForm::Adaptive(bridge) = &decorated else {
        panic!("expected a model-backed form");
    };
    assert_eq!(bridge.lifecycle().state(), LifecycleState::Ready);

    let form = decorated.form();
    assert!(pre.parent().is_none());
    assert_eq!(form.parent(), Some(block.clone()));
    assert_eq!(
        form.data("action").as_deref(),
        Some("https://author.example.test/adobe/forms/af/submit/contact")
    );
    assert_eq!(form.data("id").as_deref(), Some("contact"));
    assert_eq!(form.data("source").as_deref(), Some("aem"));
    assert_eq!(form.data("rules").as_deref(), Some("true"));
    assert_eq!(form.data("thankYouMsg").as_deref(), Some("Thanks!"));
    assert_eq!(
        form.data("formpath").as_deref(),
        Some("/content/forms/contact/jcr:content/root/form")
    );
    assert!(form.query(|e| e.is("input") && e.name() == "name").is_some());
    assert!(!form.has_class("loading"));
}

#[tokio::test]
async fn test_request_context_reaches_model() {
    let ctx = base(Arc::new(OfflineClient), FormsConfig::default());
    let (block, _) = embedded_block(&ctx, &adaptive_definition());
    let page = PageLocation {
        search: "?Campaign=Spring".to_string(),
        cookies: "visitor=42".to_string(),
        ..location()
    };
    let decorated = decorate(&block, &ctx, &page, Arc::new(FormRuntimeFactory))
        .await
        .unwrap();
    let DecoratedForm::Adaptive(bridge) = decorated else {
        panic!("expected a model-backed form");
    };
    let state = bridge.model().get_state();
    assert_eq!(state.properties["queryParams"]["campaign"], json!("Spring"));
    assert_eq!(state.properties["cookies"]["visitor"], json!("42"));
}

#[tokio::test]
async fn test_edit_mode_renders_authoring_view() {
    let ctx = base(Arc::new(OfflineClient), FormsConfig::default());
    let definition = json!({
        "id": "contact",
        "fieldType": "form",
        ":itemsOrder": ["email", "name"],
        ":items": {
            "name": {"id": "name", "name": "name", "fieldType": "text-input"},
            "email": {"id": "email", "name": "email", "fieldType": "email"}
        }
    });
    let (block, _) = embedded_block(&ctx, &definition.to_string());
    block.add_class("edit-mode");

    let decorated = decorate(&block, &ctx, &location(), Arc::new(FormRuntimeFactory))
        .await
        .unwrap();
    assert!(matches!(decorated, DecoratedForm::Authoring(_)));
    let names: Vec<String> = decorated
        .form()
        .query_all(|e| e.is("input"))
        .iter()
        .map(Element::name)
        .collect();
    assert_eq!(names, vec!["email", "name"]);
}

#[tokio::test]
async fn test_malformed_definition_empties_block() {
    let ctx = base(Arc::new(OfflineClient), FormsConfig::default());
    let (block, pre) = embedded_block(&ctx, "{\"id\": ");
    let decorated = decorate(&block, &ctx, &location(), Arc::new(FormRuntimeFactory)).await;
    assert!(decorated.is_none());
    assert!(pre.parent().is_none());
    assert!(block.children().is_empty());
    assert!(block.is_connected());
    assert!(forms(&ctx).is_empty());
}

#[tokio::test]
async fn test_block_without_definition_is_untouched() {
    let ctx = base(Arc::new(OfflineClient), FormsConfig::default());
    let block = el(ctx.document(), "div").class("form").text("Coming soon").build();
    ctx.document().body().append(&block);
    let decorated = decorate(&block, &ctx, &location(), Arc::new(FormRuntimeFactory)).await;
    assert!(decorated.is_none());
    assert_eq!(block.text_content(), "Coming soon");
}

#[tokio::test]
async fn test_unreachable_form_empties_block() {
    let ctx = base(Arc::new(OfflineClient), FormsConfig::default());
    let (block, anchor) = linked_block(&ctx, "https://site.example.test/forms/contact.json");
    let decorated = decorate(&block, &ctx, &location(), Arc::new(FormRuntimeFactory)).await;
    assert!(decorated.is_none());
    assert!(anchor.parent().is_none());
    assert!(block.children().is_empty());
}

#[tokio::test]
async fn test_linked_page_fetches_form_fragment() {
    let page = format!("<html><body><pre><code>{}</code></pre></body></html>", adaptive_definition());
    let client = StubClient::new("text/html; charset=utf-8", page);
    let ctx = base(client.clone(), FormsConfig::default());
    let (block, anchor) = linked_block(&ctx, "https://site.example.test/forms/contact.html");

    let decorated = decorate(&block, &ctx, &location(), Arc::new(FormRuntimeFactory))
        .await
        .expect("form decorated");
    assert_eq!(
        client.requested.lock().unwrap()[0],
        "https://site.example.test/forms/contact/jcr:content/root/section/form.html"
    );
    assert!(anchor.parent().is_none());
    assert_eq!(decorated.form().data("id").as_deref(), Some("contact"));
}

#[tokio::test]
async fn test_sheet_form_renders_without_rules() {
    let client = StubClient::new("application/json", contact_sheet());
    let ctx = base(client.clone(), FormsConfig::default());
    let (block, _) = linked_block(&ctx, "https://site.example.test/forms/contact.json");

    let decorated = decorate(&block, &ctx, &location(), Arc::new(FormRuntimeFactory))
        .await
        .expect("form decorated");
    assert!(matches!(decorated, DecoratedForm::Sheet(_)));
    let form = decorated.form();
    assert_eq!(form.data("source").as_deref(), Some("sheet"));
    assert_eq!(form.data("rules").as_deref(), Some("false"));
    assert_eq!(
        form.data("action").as_deref(),
        Some("https://forms.adobe.com/adobe/forms/af/submit/L2Zvcm1zL2NvbnRhY3QuanNvbg==")
    );
    assert!(form.data("formpath").is_none());
    let input = form.query(|e| e.is("input") && e.name() == "name").unwrap();
    assert_eq!(input.value(), "Ada");
}

#[tokio::test]
async fn test_sheet_submit_posts_and_rerenders() {
    let client = StubClient::new("application/json", contact_sheet());
    let ctx = base(client.clone(), FormsConfig::default());
    let (block, _) = linked_block(&ctx, "https://site.example.test/forms/contact.json");
    let decorated = decorate(&block, &ctx, &location(), Arc::new(FormRuntimeFactory))
        .await
        .unwrap();
    let old = decorated.form().clone();

    old.dispatch(EventKind::Submit, Value::Null);
    assert!(settle(|| !client.posted.lock().unwrap().is_empty()).await);
    let posted = client.posted.lock().unwrap().clone();
    assert_eq!(
        posted[0].0,
        "https://forms.adobe.com/adobe/forms/af/submit/L2Zvcm1zL2NvbnRhY3QuanNvbg=="
    );
    assert_eq!(posted[0].1["data"]["name"], json!("Ada"));

    assert!(settle(|| !old.is_connected()).await);
    let message = block.query(|e| e.has_class("success-message")).unwrap();
    assert_eq!(message.text_content(), "Got it");
    let current = forms(&ctx);
    assert_eq!(current.len(), 1);
    assert_ne!(current[0], old);
    assert_eq!(current[0].data("source").as_deref(), Some("sheet"));
}
