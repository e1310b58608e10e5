/// Resolution of a notification's `action_url` into a host navigation target.
///
/// The grammar is a small family of client-side route patterns; anything that
/// does not match is treated as an opaque absolute URL and handed to the host
/// for a direct navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    Inbox { conversation_id: String },
    Order { order_id: String },
    Client { client_id: String },
    External { url: String },
}

impl NavigationTarget {
    /// Workspace path for the navigate signal. External targets navigate to
    /// the URL itself.
    pub fn path(&self) -> &str {
        match self {
            NavigationTarget::Inbox { .. } => "/inbox",
            NavigationTarget::Order { .. } => "/orders",
            NavigationTarget::Client { .. } => "/clients",
            NavigationTarget::External { url } => url,
        }
    }

    /// Lookup key for the follow-up entity-selection signal; external targets
    /// have none.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            NavigationTarget::Inbox { conversation_id } => Some(conversation_id),
            NavigationTarget::Order { order_id } => Some(order_id),
            NavigationTarget::Client { client_id } => Some(client_id),
            NavigationTarget::External { .. } => None,
        }
    }
}

/// Resolve an `action_url` string. Returns `None` for an empty value.
pub fn resolve_action_url(action_url: &str) -> Option<NavigationTarget> {
    let trimmed = action_url.trim();
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed.starts_with('/') {
        return Some(NavigationTarget::External {
            url: trimmed.to_string(),
        });
    }

    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };

    if path == "/communications" || path.starts_with("/communications/") {
        if let Some(id) = query.and_then(|q| query_param(q, "conversation_id")) {
            return Some(NavigationTarget::Inbox {
                conversation_id: id,
            });
        }
    }

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.len() == 2 && !segments[1].is_empty() {
        match segments[0] {
            "inbox" => {
                return Some(NavigationTarget::Inbox {
                    conversation_id: segments[1].to_string(),
                })
            }
            "orders" => {
                return Some(NavigationTarget::Order {
                    order_id: segments[1].to_string(),
                })
            }
            "clients" => {
                return Some(NavigationTarget::Client {
                    client_id: segments[1].to_string(),
                })
            }
            _ => {}
        }
    }

    Some(NavigationTarget::External {
        url: trimmed.to_string(),
    })
}

fn query_param(query: &str, name: &str) -> Option<String> {
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == name && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
