use modwire::{
    Instance, MetadataRegistry, ModuleDescriptor, ModuleName, ParamBinding, ProviderSpec, Token,
    JOB_QUEUE, QUEUE_MODULE,
};

use crate::controller::NotificationsController;
use crate::jobs::send_welcome_email;

pub const NOTIFICATIONS_MODULE: ModuleName = "notifications";
pub const NOTIFICATIONS_CONTROLLER: Token = Token::new("notifications_controller");

/// Attach the notifications module. The host must attach [`QUEUE_MODULE`].
pub fn declare(registry: &mut MetadataRegistry) {
    registry
        .declare_controller(NOTIFICATIONS_CONTROLLER, "/notifications")
        .post("/welcome", "welcome")
        .bind("welcome", ParamBinding::body(0))
        .bind("welcome", ParamBinding::context(1));

    registry.attach_module(
        NOTIFICATIONS_MODULE,
        ModuleDescriptor::new()
            .import(QUEUE_MODULE)
            .provider(ProviderSpec::factory(
                NOTIFICATIONS_CONTROLLER,
                &[JOB_QUEUE],
                |deps| Ok(Instance::controller(NotificationsController::new(deps.get(0)?))),
            ))
            .controller(NOTIFICATIONS_CONTROLLER)
            .job(send_welcome_email().definition()),
    );
    tracing::debug!(module = NOTIFICATIONS_MODULE, "Module declared");
}
