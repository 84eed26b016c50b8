use gatehouse_app_gateway_core::GatewayError;

/// Extracts the application name from a request's host: the host with any
/// port stripped, split on `.`, first label.
///
/// Subdomain addressing lets one gateway endpoint serve arbitrarily many
/// applications without per-application listeners.
pub(crate) fn app_name_from_host(host: &str) -> Result<&str, GatewayError> {
    let name = strip_port(host).split('.').next().unwrap_or_default();
    if name.is_empty() {
        return Err(GatewayError::InvalidHost {
            host: host.to_string(),
        });
    }
    Ok(name)
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals carry their port outside the brackets.
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or_default();
    }
    host.split(':').next().unwrap_or(host)
}
