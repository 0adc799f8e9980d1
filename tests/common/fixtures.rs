//! Dataset fixtures and mock endpoints

use certkeeper::config::PathsConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Canonical three-row dataset whose URLs live on `base`
///
/// The rows are written exactly as the store renders them, so an unchanged
/// dataset must come back byte for byte.
pub fn dataset_csv(base: &str) -> String {
    format!(
        "Category,Certification_Name,Provider,URL,Description,Duration,Level,Prerequisites,Expiration\r\n\
         Cloud Computing,Cloud Basics,Acme,{base}/cert/cloud,Intro to cloud,Self-paced,Beginner,,\r\n\
         Cloud Computing,Serverless Fundamentals,Acme,{base}/cert/serverless,Functions,2 hours,Intermediate,Cloud Basics,\r\n\
         Web Development,Responsive Web Design,freeCodeCamp,{base}/cert/web,HTML and CSS,300 hours,Beginner,,Never\r\n"
    )
}

/// Write `csv` as the canonical dataset
pub fn write_dataset(paths: &PathsConfig, csv: &str) {
    std::fs::write(&paths.csv, csv).unwrap();
}

/// Answer every method on `route` with `status`
pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Answer `GET route` with an HTML body
pub async fn mount_html(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// All three fixture URLs answer 200
pub async fn mount_all_valid(server: &MockServer) {
    for route in ["/cert/cloud", "/cert/serverless", "/cert/web"] {
        mount_status(server, route, 200).await;
    }
}
