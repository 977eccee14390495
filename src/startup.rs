use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

use crate::logger::RequestTracing;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    current_user, health_check, login, logout, refresh, resend, signup, verify, CookiePolicy,
};
use crate::services::AuthService;

pub fn run(
    listener: TcpListener,
    auth: AuthService,
    cookie_policy: CookiePolicy,
) -> Result<Server, std::io::Error> {
    let auth = web::Data::new(auth);
    let cookie_policy = web::Data::new(cookie_policy);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestTracing)
            .app_data(auth.clone())
            .app_data(cookie_policy.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login))
                    .route("/verify", web::post().to(verify))
                    .route("/resend", web::post().to(resend))
                    .route("/refresh-token", web::post().to(refresh))
                    .route("/logout", web::post().to(logout)),
            )
            // Protected routes
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(auth.clone()))
                    .route("/me", web::get().to(current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
