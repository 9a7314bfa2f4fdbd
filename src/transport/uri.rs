//! Connection URI construction.

use url::Url;

use crate::config::SyncConfig;
use crate::error::SyncError;

/// Build `{ws|wss}://<host>/<path>?<auth_param>=<token>`.
///
/// The scheme mirrors the hosting page, and the token is percent-encoded.
/// The URL is built for a single attempt and never stored.
pub fn build_connect_url(config: &SyncConfig, token: &str) -> Result<Url, SyncError> {
	let path = config.path.trim_start_matches('/');
	let base = format!(
		"{}://{}/{}",
		config.page_scheme.websocket_scheme(),
		config.host.trim_end_matches('/'),
		path
	);

	let mut url = Url::parse(&base)?;
	url.query_pairs_mut().append_pair(&config.auth_param, token);
	Ok(url)
}

/// Render a URL for logs with the identity token masked.
pub fn redact(url: &Url, auth_param: &str) -> String {
	let mut redacted = url.clone();
	let pairs: Vec<(String, String)> = url
		.query_pairs()
		.map(|(key, value)| {
			let value = if key == auth_param {
				"***".to_string()
			} else {
				value.into_owned()
			};
			(key.into_owned(), value)
		})
		.collect();

	redacted.query_pairs_mut().clear().extend_pairs(pairs);
	redacted.to_string()
}
