//! HTTP API for registering accounts and updating their challenge TXT values.
//!
//! # API Endpoints
//!
//! ## `/healthcheck` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!
//! ## `/register` (POST)
//!
//!   Accepts an optional JSON request body of the form:
//!
//!   ```json
//!   { "allowfrom": ["192.0.2.0/24", "2001:db8::/32"], "domain_name": "example.com" }
//!   ```
//!
//!   Every `allowfrom` entry must be a CIDR prefix. An empty or missing list lets updates
//!   through from any source address. `domain_name` is a free-form label for the account.
//!
//!   Returns HTTP 201 (Created) with the generated credentials. The `password` is only ever
//!   returned here:
//!
//!   ```json
//!   {
//!     "username": "eabcdb41-d89f-4580-826f-3e62e9755ef2",
//!     "password": "pbAXVjlIOE01xbut7YnAbkhMQIkcwoHO0ek2j4Cp",
//!     "fulldomain": "d420c923-bbd7-4056-ab64-c3ca54c9b3cf.auth.example.com",
//!     "subdomain": "d420c923-bbd7-4056-ab64-c3ca54c9b3cf",
//!     "allowfrom": ["192.0.2.0/24", "2001:db8::/32"]
//!   }
//!   ```
//!
//! ## `/update` (POST)
//!
//!   Requires the `X-Api-User` and `X-Api-Key` headers returned by `/register`, and expects a
//!   JSON request body of the form:
//!
//!   ```json
//!   { "subdomain": "d420c923-bbd7-4056-ab64-c3ca54c9b3cf", "txt": "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX" }
//!  ```
//!
//!  Where `subdomain` is the subdomain owned by the authenticated account. The client
//!  `POST`ing the update must have a source IP address permitted by the account's allow-list.
//!
//!  The `txt` value must be a valid [RFC-8555][RFC-8555] [DNS-01] challenge response. It
//!  replaces the older of the two values kept for the subdomain.
//!
//!  For successful updates, returns HTTP 200 (OK) and a JSON response body of the form:
//!
//!  ```json
//!  { "txt": "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX" }
//!  ```
//!
//!  Bad credentials give HTTP 401, a disallowed source address or foreign subdomain HTTP 403.
//!
//! ## `/domains` (GET)
//!
//!  Admin only: requires `X-Api-Key` to match the configured `admin_api_key`. Lists every
//!  registered account with its `username`, `fulldomain`, `subdomain`, `allowfrom`,
//!  `domain_name`, `created_at` and `updated_at`.
//!
//! ## `/update_name` (POST)
//!
//!  Admin only. Expects `{ "fulldomain": "...", "domain_name": "..." }` and replaces the label of
//!  the account owning `fulldomain`. Unknown subdomains give HTTP 404.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

mod api_error;
mod model;
mod routes;
pub mod server;

pub use server::new;
