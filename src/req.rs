use serde::{de::DeserializeOwned, Serialize};

use crate::api::{Response, ResponseMessage};

pub(crate) async fn req_post<T>(
    client: &reqwest::Client,
    url: reqwest::Url,
    body: &T,
) -> reqwest::Result<reqwest::Response>
where
    T: Serialize + ?Sized,
{
    let req = client.post(url).json(body);
    log::trace!("{req:?}");
    req.send().await
}

/// Decodes the CFSSL envelope of `res`, turning API level failures into [`ResponseMessage`]s.
pub(crate) async fn req_handle_response<R>(res: reqwest::Response) -> eyre::Result<R>
where
    R: DeserializeOwned,
{
    let status = res.status();
    let body = req_safe_read_body(res).await;
    log::debug!("{status} {body}");

    match serde_json::from_str::<Response<R>>(&body) {
        Ok(envelope) => match envelope.into_result() {
            Ok(result) => Ok(result),

            Err(msg) if msg.is_policy_error() => {
                log::warn!("CA refused the request on policy grounds: {msg}");
                Err(eyre::Report::from(msg).wrap_err("refused by CA policy"))
            }

            Err(msg) => Err(msg.into()),
        },

        // some other problem, like a proxy in the way
        Err(_) if !status.is_success() => Err(ResponseMessage::new(
            i64::from(status.as_u16()),
            format!("{status} body: {body}"),
        )
        .into()),

        Err(err) => Err(eyre::eyre!("malformed response ({err}) body: {body}")),
    }
}

pub(crate) async fn req_safe_read_body(res: reqwest::Response) -> String {
    // the body may be cut short by an abrupt close even though most of it was received
    res.text().await.unwrap_or_default()
}
