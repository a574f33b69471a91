use actix_files as fs;
use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AccessTokenBlacklist, AuthService, RefreshTokenStore};
use crate::clock::Clock;
use crate::configuration::Settings;
use crate::identifiers::IdentifierGenerator;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::records::{AppointmentRequestService, InvoiceService};
use crate::routes::{
    change_password, cleanup_tokens, create_invoice, create_staff, get_current_user, get_invoice,
    health_check, login, logout, refresh, register, request_appointment,
};
use crate::storage::Storage;

/// Services shared by every worker
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub invoices: InvoiceService,
    pub appointments: AppointmentRequestService,
}

impl AppState {
    /// Wire every service onto one storage backend and one clock.
    pub fn new<S: Storage + 'static>(storage: Arc<S>, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
        let refresh_tokens = RefreshTokenStore::new(storage.clone(), clock.clone());
        let blacklist = AccessTokenBlacklist::new(storage.clone(), clock.clone());
        let identifiers = IdentifierGenerator::new(storage.clone(), clock.clone());

        let auth = AuthService::new(
            storage.clone(),
            refresh_tokens,
            blacklist,
            clock.clone(),
            settings.jwt.clone(),
        );
        let invoices = InvoiceService::new(
            storage.clone(),
            identifiers.clone(),
            clock.clone(),
            settings.billing.clone(),
        );
        let appointments =
            AppointmentRequestService::new(storage, identifiers, clock, &settings.billing);

        Self {
            auth,
            invoices,
            appointments,
        }
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let auth = web::Data::new(state.auth);
    let invoices = web::Data::new(state.invoices);
    let appointments = web::Data::new(state.appointments);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::new("%r %s %Dms"))  // No headers, Authorization must not reach the logs
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(auth.clone())
            .app_data(invoices.clone())
            .app_data(appointments.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/appointment-requests", web::post().to(request_appointment))

            // Protected routes (JWT + blacklist)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(auth.get_ref().clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/auth/logout", web::post().to(logout))
                    .route("/auth/change-password", web::post().to(change_password))
                    .route("/staff", web::post().to(create_staff))
                    .route("/invoices", web::post().to(create_invoice))
                    .route("/invoices/{invoice_number}", web::get().to(get_invoice))
                    .route("/maintenance/cleanup", web::post().to(cleanup_tokens)),
            )

            // Static file serving (must be last to not override API routes)
            .service(fs::Files::new("/", "./public").index_file("index.html"))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
