use serde::{Deserialize, Serialize};

/// Server reply to a single request.
///
/// Serialized as a JSON object tagged by `status`:
///
/// ```text
/// {"status":"OK","data":"File a.txt uploaded successfully."}
/// {"status":"OK","data":["a.txt","b.txt"]}
/// {"status":"OK","data_namafile":"a.txt","data_file":"aGVsbG8="}
/// {"status":"ERROR","data":"file 'a.txt' not found"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "OK")]
    Ok(Payload),
    #[serde(rename = "ERROR")]
    Err { data: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    File {
        #[serde(rename = "data_namafile")]
        name: String,
        #[serde(rename = "data_file")]
        content: String,
    },
    Listing {
        data: Vec<String>,
    },
    Message {
        data: String,
    },
}

impl Response {
    pub fn message(data: impl Into<String>) -> Self {
        Response::Ok(Payload::Message { data: data.into() })
    }

    pub fn listing(data: Vec<String>) -> Self {
        Response::Ok(Payload::Listing { data })
    }

    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Response::Ok(Payload::File {
            name: name.into(),
            content: content.into(),
        })
    }

    pub fn error(data: impl ToString) -> Self {
        Response::Err {
            data: data.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }
}
