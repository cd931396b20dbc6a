#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use apkd::app::{App, AppVersion};
use apkd::error::{ApkdError, Result};
use apkd::source::{versions_limit_reached, Source};

/// How a mock source answers for one package.
#[derive(Clone)]
pub enum Answer {
    Versions(Vec<i64>),
    NotFound,
    Broken,
}

/// Deterministic in-memory source with call accounting.
pub struct MockSource {
    name: String,
    answers: HashMap<String, Answer>,
    developers: HashMap<String, String>,
    catalogue: HashMap<String, BTreeSet<String>>,
    link_base: Option<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            answers: HashMap::new(),
            developers: HashMap::new(),
            catalogue: HashMap::new(),
            link_base: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn answer(mut self, package: &str, answer: Answer) -> Self {
        self.answers.insert(package.to_string(), answer);
        self
    }

    pub fn developer(mut self, package: &str, developer: &str) -> Self {
        self.developers
            .insert(package.to_string(), developer.to_string());
        self.catalogue
            .entry(developer.to_string())
            .or_default()
            .insert(package.to_string());
        self
    }

    pub fn links(mut self, base: &str) -> Self {
        self.link_base = Some(base.to_string());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_app_info(&self, package: &str, versions_limit: Option<usize>) -> Result<App> {
        self.calls.lock().unwrap().push(package.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match self.answers.get(package).cloned().unwrap_or(Answer::NotFound) {
            Answer::NotFound => Err(ApkdError::AppNotFound {
                package: package.to_string(),
            }),
            Answer::Broken => Err(ApkdError::channel(&self.name, "upstream returned garbage")),
            Answer::Versions(mut codes) => {
                codes.sort_unstable_by(|a, b| b.cmp(a));
                let mut versions = Vec::new();
                for code in codes {
                    if versions_limit_reached(versions.len(), versions_limit) {
                        break;
                    }
                    let mut version =
                        AppVersion::new(format!("{code}.0"), code, 1024, self.id());
                    if let Some(base) = &self.link_base {
                        version = version.with_download_link(format!("{base}/{package}_{code}.apk"));
                    }
                    versions.push(version);
                }
                let mut app = App::new(package, self.id());
                app.set_versions(versions);
                Ok(app)
            }
        }
    }

    async fn get_developer_id(&self, package: &str) -> Result<Option<String>> {
        Ok(self.developers.get(package).cloned())
    }

    async fn find_packages_from_developer(&self, developer_id: &str) -> Result<BTreeSet<String>> {
        self.catalogue
            .get(developer_id)
            .cloned()
            .ok_or_else(|| ApkdError::DeveloperNotFound {
                developer: developer_id.to_string(),
            })
    }
}

pub fn as_sources(sources: Vec<Arc<MockSource>>) -> Vec<Arc<dyn Source>> {
    sources
        .into_iter()
        .map(|source| source as Arc<dyn Source>)
        .collect()
}
