// ── Command pipeline ──
//
// State-changing and query commands issued against the current session.
// Every command authenticates on demand and, on a 401, renews the session
// exactly once before giving up. No routing state is mirrored locally.

use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue, ORIGIN, REFERER};
use tracing::{debug, info, warn};

use tieline_api::wire::{MATRIX_PATH, PROBE_PATH};
use tieline_api::{CommandRequest, Error as ApiError, HttpResponse, SessionManager};

use crate::error::CoreError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Raw feature-list document, handed to an external parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureList {
    document: String,
}

impl FeatureList {
    pub fn as_str(&self) -> &str {
        &self.document
    }
}

/// A routing update for one output.
///
/// No inputs means the output is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUpdate {
    output_id: String,
    input_ids: Vec<String>,
}

impl RouteUpdate {
    pub fn new<S: AsRef<str>>(output_id: &str, input_ids: &[S]) -> Result<Self, CoreError> {
        if output_id.is_empty() {
            return Err(invalid("output id must not be empty"));
        }
        if has_markup(output_id) {
            return Err(invalid(format!("output id '{output_id}' contains XML markup")));
        }

        let mut inputs = Vec::with_capacity(input_ids.len());
        for id in input_ids {
            let id = id.as_ref();
            if id.is_empty() || id.contains(',') || has_markup(id) {
                return Err(invalid(format!("invalid input id '{id}'")));
            }
            inputs.push(id.to_owned());
        }

        Ok(Self {
            output_id: output_id.to_owned(),
            input_ids: inputs,
        })
    }

    pub fn disable(output_id: &str) -> Result<Self, CoreError> {
        Self::new::<&str>(output_id, &[])
    }

    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    pub fn is_disable(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// The `updateRuntime` document the device expects.
    pub fn to_body(&self) -> String {
        format!(
            "<updateRuntime><base><output id=\"{}\">{}</output></base></updateRuntime>",
            self.output_id,
            self.input_ids.join(",")
        )
    }
}

fn has_markup(id: &str) -> bool {
    id.contains(['<', '>', '&', '"', '\''])
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::ValidationFailed {
        message: message.into(),
    }
}

/// Issues routing and feature commands with a bounded auth retry.
#[derive(Clone)]
pub struct CommandPipeline {
    session: Arc<SessionManager>,
    features_path: String,
}

impl CommandPipeline {
    pub fn new(session: Arc<SessionManager>, features_path: impl Into<String>) -> Self {
        Self {
            session,
            features_path: features_path.into(),
        }
    }

    /// Route `input_ids` to `output_id`, replacing any previous route.
    pub async fn set_route<S: AsRef<str>>(
        &self,
        output_id: &str,
        input_ids: &[S],
    ) -> Result<(), CoreError> {
        let update = RouteUpdate::new(output_id, input_ids)?;
        self.apply(&update).await
    }

    /// Clear the route of `output_id`.
    pub async fn disable_output(&self, output_id: &str) -> Result<(), CoreError> {
        let update = RouteUpdate::disable(output_id)?;
        self.apply(&update).await
    }

    /// Send a prepared routing update.
    pub async fn apply(&self, update: &RouteUpdate) -> Result<(), CoreError> {
        let operation = if update.is_disable() {
            "disable output"
        } else {
            "set route"
        };
        info!(output = update.output_id(), inputs = ?update.input_ids, "{operation}");

        let origin = self.session.credentials().origin();
        let request = CommandRequest::post(MATRIX_PATH, update.to_body())
            .with_header(ACCEPT, HeaderValue::from_static("*/*"))
            .with_header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
            .with_header(
                HeaderName::from_static("x-requested-with"),
                HeaderValue::from_static("XMLHttpRequest"),
            )
            .with_header(ORIGIN, header_value(&origin)?)
            .with_header(REFERER, header_value(&format!("{origin}{PROBE_PATH}"))?);

        self.execute(operation, request).await?;
        debug!(output = update.output_id(), "{operation} accepted");
        Ok(())
    }

    /// Fetch the raw feature-list document.
    pub async fn query_features(&self) -> Result<FeatureList, CoreError> {
        let request = CommandRequest::get(self.features_path.clone())
            .with_header(ACCEPT, HeaderValue::from_static("application/xml, text/xml, */*"));
        let response = self.execute("query features", request).await?;
        Ok(FeatureList {
            document: response.body,
        })
    }

    /// Send `request`; on a 401 renew the session once and resend once.
    async fn execute(
        &self,
        operation: &'static str,
        request: CommandRequest,
    ) -> Result<HttpResponse, CoreError> {
        self.session.ensure_authenticated().await?;

        let stale = match self.session.send(request.clone()).await {
            Ok(signed) if signed.response.status == 401 => Some(signed.epoch),
            Ok(signed) => return accept(operation, signed.response),
            // Expired by a concurrent keep-alive between ensure and send.
            Err(ApiError::NotAuthenticated) => None,
            Err(e) => return Err(e.into()),
        };

        warn!(operation, "session rejected; re-authenticating once");
        match stale {
            Some(epoch) => self.session.reauthenticate_from(epoch).await?,
            None => self.session.ensure_authenticated().await?,
        }

        let retry = self.session.send(request).await?;
        if retry.response.status == 401 {
            self.session.invalidate(retry.epoch);
        }
        accept(operation, retry.response)
    }
}

fn accept(operation: &str, response: HttpResponse) -> Result<HttpResponse, CoreError> {
    if response.is_ok() {
        Ok(response)
    } else {
        warn!(operation, status = response.status, "command failed");
        Err(CoreError::CommandRejected {
            operation: operation.into(),
            status: response.status,
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, CoreError> {
    HeaderValue::from_str(value).map_err(|_| CoreError::Config {
        message: format!("'{value}' is not a valid header value"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn single_input_body() {
        let update = RouteUpdate::new("hpl", &["in3"]).unwrap();
        assert_eq!(
            update.to_body(),
            r#"<updateRuntime><base><output id="hpl">in3</output></base></updateRuntime>"#
        );
    }

    #[test]
    fn disable_body_has_empty_element() {
        let update = RouteUpdate::disable("hpl").unwrap();
        assert!(update.is_disable());
        assert_eq!(
            update.to_body(),
            r#"<updateRuntime><base><output id="hpl"></output></base></updateRuntime>"#
        );
    }

    #[test]
    fn multiple_inputs_are_comma_joined() {
        let update = RouteUpdate::new("out1", &["enc1", "enc2"]).unwrap();
        assert_eq!(
            update.to_body(),
            r#"<updateRuntime><base><output id="out1">enc1,enc2</output></base></updateRuntime>"#
        );
    }

    #[test]
    fn rejects_markup_and_empty_ids() {
        assert!(RouteUpdate::new("", &["in1"]).is_err());
        assert!(RouteUpdate::new("a\"b", &["in1"]).is_err());
        assert!(RouteUpdate::new("hpl", &["<x/>"]).is_err());
        assert!(RouteUpdate::new("hpl", &["in1,in2"]).is_err());
        assert!(RouteUpdate::new("hpl", &[""]).is_err());
    }
}
