use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use innkeep_core::repository::EventSource;
use innkeep_core::UpstreamQueryError;
use innkeep_shared::time::format_timestamp;
use innkeep_shared::{HotelActivityBooking, HotelRoomBooking};

/// Storage service reached over its REST query endpoints.
pub struct HttpEventSource {
    http_client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpEventSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
            timeout,
        })
    }

    fn endpoint(&self, collection: &str) -> String {
        format!("{}/booking/{}", self.base_url.trim_end_matches('/'), collection)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        collection: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<T>, UpstreamQueryError> {
        let url = self.endpoint(collection);
        debug!(%url, start = %format_timestamp(&start), end = %format_timestamp(&end), "Querying storage service");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("start_timestamp", format_timestamp(&start)),
                ("end_timestamp", format_timestamp(&end)),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamQueryError::Timeout(self.timeout)
                } else {
                    UpstreamQueryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamQueryError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| UpstreamQueryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn room_bookings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelRoomBooking>, UpstreamQueryError> {
        self.fetch("hotel-rooms", start, end).await
    }

    async fn activity_bookings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelActivityBooking>, UpstreamQueryError> {
        self.fetch("hotel-activities", start, end).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    /// Serves `app` on an ephemeral port and returns its base url.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{}", addr)
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = DateTime::parse_from_rfc3339("2024-03-01T12:00:00.000Z").unwrap().with_timezone(&Utc);
        (start, start + chrono::Duration::seconds(5))
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let plain = HttpEventSource::new("http://storage:8080", Duration::from_secs(1)).unwrap();
        let slashed = HttpEventSource::new("http://storage:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(plain.endpoint("hotel-rooms"), "http://storage:8080/booking/hotel-rooms");
        assert_eq!(slashed.endpoint("hotel-rooms"), plain.endpoint("hotel-rooms"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_a_transport_failure() {
        // Nothing listens on the discard port.
        let source = HttpEventSource::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let start = Utc::now();
        let result = source.room_bookings(start, start).await;
        assert!(matches!(
            result,
            Err(UpstreamQueryError::Transport(_)) | Err(UpstreamQueryError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_non_success_status_carries_url_and_body() {
        let app = Router::new().route(
            "/booking/hotel-rooms",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let source = HttpEventSource::new(serve(app).await, Duration::from_secs(2)).unwrap();
        let (start, end) = window();

        match source.room_bookings(start, end).await {
            Err(UpstreamQueryError::Status { url, status, body }) => {
                assert!(url.ends_with("/booking/hotel-rooms"));
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected a status failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_decode_failure() {
        let app = Router::new()
            .route("/booking/hotel-activities", get(|| async { "[{\"hotel_id\": " }))
            .route("/booking/hotel-rooms", get(|| async { Json(json!({"not": "a list"})) }));
        let source = HttpEventSource::new(serve(app).await, Duration::from_secs(2)).unwrap();
        let (start, end) = window();

        assert!(matches!(
            source.activity_bookings(start, end).await,
            Err(UpstreamQueryError::Decode(_))
        ));
        assert!(matches!(
            source.room_bookings(start, end).await,
            Err(UpstreamQueryError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_window_is_sent_as_query_parameters() {
        let app = Router::new().route(
            "/booking/hotel-rooms",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                Json(json!([{
                    "hotel_id": params["start_timestamp"],
                    "customer_id": params["end_timestamp"],
                    "room_id": "R1",
                    "room_type": "double",
                    "num_of_people": 2,
                    "check_in_date": "2024-04-01",
                    "check_out_date": "2024-04-02",
                    "timestamp": "2024-03-01T12:00:00.000Z",
                    "trace_id": "t-1"
                }]))
            }),
        );
        let source = HttpEventSource::new(serve(app).await, Duration::from_secs(2)).unwrap();
        let (start, end) = window();

        let rooms = source.room_bookings(start, end).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].hotel_id, "2024-03-01T12:00:00.000Z");
        assert_eq!(rooms[0].customer_id, "2024-03-01T12:00:05.000Z");
    }
}
