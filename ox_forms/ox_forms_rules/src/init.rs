use crate::bridge::RuleEngineBridge;
use crate::error::BridgeError;
use crate::host::{ChannelHost, InProcessHost, WorkerHost};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::runtime::RuntimeFactory;
use crate::worker::{FromWorker, InitPayload, RuleEngineWorker, ToWorker};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info};
use ox_forms::context::FormContext;
use ox_forms::dom::{Element, EventKind};
use ox_forms::form::{apply_form_dataset, create_form};
use ox_forms::schema::FormDefinition;
use std::sync::Arc;

/// Page details the form needs from its location.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageRequest {
    /// Query string, including the leading `?`.
    pub search: String,
    /// Path of the form document, used when the definition has no action.
    pub pathname: Option<String>,
}

fn host_for(ctx: &FormContext, worker: RuleEngineWorker) -> Box<dyn WorkerHost> {
    if ctx.config().use_worker && tokio::runtime::Handle::try_current().is_ok() {
        debug!("Form '{}' initializes on a worker task", ctx.form_id());
        Box::new(ChannelHost::spawn(worker))
    } else {
        debug!("Form '{}' initializes in process", ctx.form_id());
        Box::new(InProcessHost::new(worker))
    }
}

/// Renders a model-backed form and binds it to a field model.
///
/// The DOM is rendered from the worker's initial state, then synced exactly
/// once with the state the worker reaches after prefill. The returned bridge
/// is ready for user interaction.
pub async fn init_adaptive_form(
    ctx: Arc<FormContext>,
    definition: FormDefinition,
    request: &PageRequest,
    factory: Arc<dyn RuntimeFactory>,
) -> Result<Arc<RuleEngineBridge>, BridgeError> {
    let lifecycle = Arc::new(Lifecycle::new());
    lifecycle.transition(LifecycleState::Initializing)?;
    let worker = RuleEngineWorker::new(
        factory.clone(),
        ctx.http().clone(),
        Arc::new(ctx.config().clone()),
    );
    let mut host = host_for(&ctx, worker);

    host.send(ToWorker::Init(Box::new(InitPayload {
        definition: definition.clone(),
        search: request.search.clone(),
    })))
    .await?;
    let state = match host.next_message().await? {
        FromWorker::Init(state) => *state,
        other => return Err(BridgeError::protocol("init", other.name())),
    };

    let rendered = create_form(&ctx, &state).await;
    let form = rendered.form;
    apply_form_dataset(&form, &state, ctx.source(), true, request.pathname.as_deref());
    form.add_class("loading");

    lifecycle.transition(LifecycleState::Restoring)?;
    host.send(ToWorker::Decorated).await?;
    let restored = match host.next_message().await? {
        FromWorker::Restore(state) => *state,
        other => return Err(BridgeError::protocol("restore", other.name())),
    };
    let model = factory.restore(restored);
    let bridge = RuleEngineBridge::attach(ctx.clone(), form.clone(), rendered.captcha, lifecycle.clone(), model);

    loop {
        match host.next_message().await? {
            FromWorker::FieldChanged(payload) => bridge.apply_field_changed(*payload).await,
            FromWorker::SyncComplete => break,
            other => return Err(BridgeError::protocol("fieldChanged or sync-complete", other.name())),
        }
    }
    form.remove_class("loading");
    lifecycle.transition(LifecycleState::Ready)?;
    bridge.process_pending().await;

    install_reset(&form, &bridge, &ctx, definition, request.clone(), factory);
    info!("Adaptive form '{}' ready", ctx.form_id());
    Ok(bridge)
}

/// A reset throws the bound form away: the bridge is disposed and a fresh form
/// replaces the old element.
fn install_reset(
    form: &Element,
    bridge: &Arc<RuleEngineBridge>,
    ctx: &Arc<FormContext>,
    definition: FormDefinition,
    request: PageRequest,
    factory: Arc<dyn RuntimeFactory>,
) {
    let bridge = Arc::clone(bridge);
    let ctx = Arc::clone(ctx);
    let target = form.downgrade();
    form.add_listener(EventKind::Reset, move |_| {
        if bridge.lifecycle().is_disposed() {
            return;
        }
        let Some(old) = target.upgrade() else { return };
        bridge.dispose();
        let reinit = reinitialize(ctx.fresh(), old, definition.clone(), request.clone(), factory.clone());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(reinit);
            }
            Err(_) => futures::executor::block_on(reinit),
        }
    });
}

fn reinitialize(
    ctx: Arc<FormContext>,
    old: Element,
    definition: FormDefinition,
    request: PageRequest,
    factory: Arc<dyn RuntimeFactory>,
) -> BoxFuture<'static, ()> {
    async move {
        match init_adaptive_form(ctx.clone(), definition, &request, factory).await {
            Ok(bridge) => {
                old.replace_with(bridge.form());
                old.release();
                bridge.spawn_event_loop();
                debug!("Form '{}' re-initialized after reset", ctx.form_id());
            }
            Err(e) => error!("Form '{}' could not be re-initialized: {}", ctx.form_id(), e),
        }
    }
    .boxed()
}
