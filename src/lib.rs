pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod aes;
    pub mod hasher;
    pub mod pkcs12;
}

pub mod models {
    pub mod certificate;
    pub mod medical_certificate;
    pub mod session;
    pub mod signed_document;
    pub mod verification;
}

pub mod repositories;

pub mod services {
    pub mod sessions;
    pub mod share_tokens;
    pub mod signing;
    pub mod verification;
}

pub mod handlers {
    pub mod documents;
    pub mod sessions;
    pub mod share;
    pub mod verification;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod csrf;
    pub mod rate_limit;
}

pub mod validation {
    pub mod documents;
}

#[cfg(test)]
pub(crate) mod testing;
