//! Process-wide rustls setup

use std::sync::Once;

use tracing::debug;

static INSTALL: Once = Once::new();

/// Install `ring` as the process-level rustls crypto provider.
///
/// `wss://` connects resolve their TLS config from the process default, which
/// rustls cannot pick on its own when more than one provider is compiled in.
/// A provider installed earlier by the host process is left in place.
pub fn install_crypto_provider() {
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }
    });
}
