//! Concrete service implementations

mod broker_service;
mod instruments_service;
mod scheduler_service;
mod telegram_service;
mod webserver_service;

pub use broker_service::BrokerService;
pub use instruments_service::InstrumentsService;
pub use scheduler_service::SchedulerService;
pub use telegram_service::TelegramService;
pub use webserver_service::WebserverService;
