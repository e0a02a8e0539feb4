use crate::server::ServerError;
use axum::{
    Form,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Multipart, Request},
};
use careers_common::model::form::{FieldValue, FormFields, Upload, ValidationErrors};
use headers::{ContentType, HeaderMapExt};
use mime::Mime;
use serde_json::Value;

#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(axum::extract::Query), rejection(ServerError))]
pub struct Query<T>(pub T);

/// Submitted fields from a JSON, url-encoded or multipart body.
///
/// A request without a body and without a content type yields no fields, so
/// the handler reports every required field as missing.
#[derive(Debug)]
pub struct Fields(pub FormFields);

impl<S> FromRequest<S> for Fields
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        // A malformed header is treated like a missing one.
        let mime = request
            .headers()
            .typed_try_get::<ContentType>()
            .ok()
            .flatten()
            .map(Mime::from);

        let fields = match mime.as_ref().map(Mime::essence_str) {
            Some("application/json") => {
                let body = Bytes::from_request(request, state).await?;
                json_fields(&body)?
            }
            Some("application/x-www-form-urlencoded") => {
                let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, state).await?;
                pairs
                    .into_iter()
                    .map(|(name, value)| (name, FieldValue::Text(value)))
                    .collect()
            }
            Some("multipart/form-data") => {
                let multipart = Multipart::from_request(request, state).await?;
                multipart_fields(multipart).await?
            }
            _ => {
                let body = Bytes::from_request(request, state).await?;
                if !body.is_empty() {
                    let content_type = mime.as_ref().map(Mime::to_string).unwrap_or_default();
                    return Err(ServerError::UnsupportedMediaType(content_type));
                }
                FormFields::new()
            }
        };

        Ok(Self(fields))
    }
}

fn json_fields(body: &[u8]) -> Result<FormFields, ServerError> {
    if body.is_empty() {
        return Ok(FormFields::new());
    }

    match serde_json::from_slice::<Value>(body).map_err(ServerError::MalformedJson)? {
        Value::Object(object) => Ok(object
            .into_iter()
            .map(|(name, value)| (name, json_field(value)))
            .collect()),
        other => {
            let mut errors = ValidationErrors::new();
            errors.add(
                "non_field_errors",
                format!(
                    "Invalid data. Expected a dictionary, but got {}.",
                    json_type_name(&other)
                ),
            );
            Err(errors.into())
        }
    }
}

fn json_field(value: Value) -> FieldValue {
    match value {
        Value::String(text) => FieldValue::Text(text),
        Value::Number(number) => FieldValue::Text(number.to_string()),
        Value::Null => FieldValue::Null,
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => FieldValue::Unsupported,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

async fn multipart_fields(mut multipart: Multipart) -> Result<FormFields, ServerError> {
    let mut fields = FormFields::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if let Some(file_name) = field.file_name().map(str::to_owned) {
            let bytes = field.bytes().await?.to_vec();
            // Browsers send an empty part with an empty file name for a blank file input.
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            fields.insert(
                name,
                FieldValue::File(Upload {
                    file_name: Some(file_name),
                    bytes,
                }),
            );
        } else {
            let text = field.text().await?;
            fields.insert(name, FieldValue::Text(text));
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use crate::server::{
        ServerError,
        extract::{json_field, json_fields},
    };
    use careers_common::model::form::FieldValue;
    use serde_json::json;

    #[test]
    fn json_values_map_to_fields() {
        assert_eq!(json_field(json!("a")), FieldValue::Text("a".into()));
        assert_eq!(json_field(json!(12)), FieldValue::Text("12".into()));
        assert_eq!(json_field(json!(null)), FieldValue::Null);
        assert_eq!(json_field(json!(true)), FieldValue::Unsupported);
        assert_eq!(json_field(json!(["a"])), FieldValue::Unsupported);
    }

    #[test]
    fn json_body_must_be_an_object() {
        assert!(json_fields(b"").is_ok());
        assert!(matches!(
            json_fields(b"{not json"),
            Err(ServerError::MalformedJson(_))
        ));

        let Err(ServerError::Validation(errors)) = json_fields(b"[1, 2]") else {
            panic!("expected a validation error");
        };
        assert_eq!(
            errors.get("non_field_errors"),
            Some(&["Invalid data. Expected a dictionary, but got list.".to_owned()][..])
        );
    }
}
