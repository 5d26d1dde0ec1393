//! Test harness: in-memory stores, a fake object store, a recording mailer and
//! a driver that sends requests through the assembled router.

use std::{
    cmp::Ordering,
    sync::{
        atomic::{AtomicBool, Ordering as AtomicOrdering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        Method, Request, StatusCode,
    },
    Router,
};
use bytes::Bytes;
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    app::build_app,
    auth::{
        repo::UserStore,
        repo_types::{NewUser, ProfileUpdate, User},
        session::SESSION_COOKIE,
    },
    config::{AppConfig, DatabaseConfig, Environment, JwtConfig},
    email::{EmailMessage, EmailSender},
    free_shelf::{
        repo::FreeShelfStore,
        repo_types::{FreeShelfEntry, NewFreeShelfEntry},
    },
    listings::{
        query::{Condition, Direction, ListingField, ListingQuery},
        repo::ListingStore,
        repo_types::{Listing, ListingPatch, NewListing},
    },
    orders::{
        repo::OrderStore,
        repo_types::{NewOrder, Order, STATUS_PAID},
    },
    state::AppState,
    storage::StorageClient,
};

pub fn test_config() -> AppConfig {
    AppConfig {
        environment: Environment::Development,
        database: DatabaseConfig {
            url: "postgres://localhost:1/campusshelf_test".into(),
            max_connections: 1,
        },
        jwt: JwtConfig {
            secret: "test-secret".into(),
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
        },
        public_base_url: "http://localhost:3000".into(),
        s3: None,
        email: None,
    }
}

// ---- stores ----

#[derive(Default)]
struct Tables {
    seq: u64,
    users: Vec<User>,
    listings: Vec<(u64, Listing)>,
    orders: Vec<Order>,
    shelf: Vec<FreeShelfEntry>,
}

impl Tables {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// One in-memory backing for every store trait.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Every store call fails from now on, as if the database went away.
    pub fn go_offline(&self) {
        self.offline.store(true, AtomicOrdering::SeqCst);
    }

    fn reachable(&self) -> anyhow::Result<()> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(anyhow::anyhow!("connection refused").context("store unavailable"));
        }
        Ok(())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = self.tables.lock().unwrap();
        f(&mut tables)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        self.reachable()?;
        Ok(self.with(|t| {
            if t.users.iter().any(|u| u.email == new.email) {
                return None;
            }
            let user = User {
                id: Uuid::new_v4(),
                name: new.name,
                email: new.email,
                password_hash: new.password_hash,
                college: new.college,
                phone: new.phone,
                email_verified: new.email_verified,
                verification_token: None,
                reset_token: None,
                reset_token_expires: None,
                created_at: OffsetDateTime::now_utc(),
            };
            t.users.push(user.clone());
            Some(user)
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        self.reachable()?;
        Ok(self.with(|t| t.users.iter().find(|u| u.id == id).cloned()))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.reachable()?;
        Ok(self.with(|t| t.users.iter().find(|u| u.email == email).cloned()))
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> anyhow::Result<Option<User>> {
        self.reachable()?;
        Ok(self.with(|t| {
            let user = t.users.iter_mut().find(|u| u.id == id)?;
            if let Some(name) = update.name {
                user.name = name;
            }
            if let Some(phone) = update.phone {
                user.phone = Some(phone);
            }
            if let Some(college) = update.college {
                user.college = Some(college);
            }
            Some(user.clone())
        }))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.reachable()?;
        self.with(|t| {
            if let Some(user) = t.users.iter_mut().find(|u| u.id == id) {
                user.reset_token = Some(token.to_string());
                user.reset_token_expires = Some(expires);
            }
        });
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> anyhow::Result<Option<Uuid>> {
        self.reachable()?;
        Ok(self.with(|t| {
            let user = t.users.iter_mut().find(|u| {
                u.reset_token.as_deref() == Some(token)
                    && u.reset_token_expires.is_some_and(|exp| exp > now)
            })?;
            user.password_hash = password_hash.to_string();
            user.reset_token = None;
            user.reset_token_expires = None;
            Some(user.id)
        }))
    }

    async fn consume_verification_token(&self, token: &str) -> anyhow::Result<Option<Uuid>> {
        self.reachable()?;
        Ok(self.with(|t| {
            let user = t
                .users
                .iter_mut()
                .find(|u| u.verification_token.as_deref() == Some(token))?;
            user.email_verified = true;
            user.verification_token = None;
            Some(user.id)
        }))
    }
}

fn field_text(listing: &Listing, field: ListingField) -> String {
    match field {
        ListingField::Title => listing.title.clone(),
        ListingField::Category => listing.category.clone(),
        ListingField::College => listing.college.clone(),
        ListingField::Price => listing.price.to_string(),
        ListingField::Rating => listing.rating.to_string(),
        ListingField::Reviews => listing.reviews.to_string(),
        ListingField::Quantity => listing.quantity.to_string(),
        ListingField::CreatedAt => listing.created_at.to_string(),
    }
}

fn matches(listing: &Listing, condition: &Condition) -> bool {
    match condition {
        Condition::Equals { field, value } => field_text(listing, *field) == *value,
        Condition::ContainsIgnoreCase { field, needle } => field_text(listing, *field)
            .to_lowercase()
            .contains(&needle.to_lowercase()),
        Condition::AnyOf(options) => options.iter().any(|c| matches(listing, c)),
    }
}

fn compare(a: &Listing, b: &Listing, field: ListingField) -> Ordering {
    match field {
        ListingField::Title => a.title.cmp(&b.title),
        ListingField::Category => a.category.cmp(&b.category),
        ListingField::College => a.college.cmp(&b.college),
        ListingField::Price => a.price.total_cmp(&b.price),
        ListingField::Rating => a.rating.total_cmp(&b.rating),
        ListingField::Reviews => a.reviews.cmp(&b.reviews),
        ListingField::Quantity => a.quantity.cmp(&b.quantity),
        ListingField::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

fn apply_patch(patch: ListingPatch, listing: &mut Listing) {
    if let Some(title) = patch.title {
        listing.title = title;
    }
    if let Some(description) = patch.description {
        listing.description = description;
    }
    if let Some(category) = patch.category {
        listing.category = category.as_str().to_string();
    }
    if let Some(price) = patch.price {
        listing.price = price;
    }
    if let Some(original_price) = patch.original_price {
        listing.original_price = Some(original_price);
    }
    if let Some(college) = patch.college {
        listing.college = college;
    }
    if let Some(quantity) = patch.quantity {
        listing.quantity = quantity;
    }
    if let Some(images) = patch.images {
        listing.images = images;
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn insert(&self, new: NewListing) -> anyhow::Result<Listing> {
        self.reachable()?;
        Ok(self.with(|t| {
            let now = OffsetDateTime::now_utc();
            let listing = Listing {
                id: Uuid::new_v4(),
                title: new.title,
                category: new.category.as_str().to_string(),
                price: new.price,
                original_price: new.original_price,
                images: new.images,
                college: new.college,
                description: new.description,
                owner_id: new.owner_id,
                owner_name: new.owner_name,
                rating: 0.0,
                reviews: 0,
                quantity: new.quantity,
                created_at: now,
                updated_at: now,
            };
            let seq = t.next_seq();
            t.listings.push((seq, listing.clone()));
            listing
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Listing>> {
        self.reachable()?;
        Ok(self.with(|t| {
            t.listings
                .iter()
                .find(|(_, l)| l.id == id)
                .map(|(_, l)| l.clone())
        }))
    }

    async fn find(&self, query: &ListingQuery) -> anyhow::Result<(Vec<Listing>, i64)> {
        self.reachable()?;
        Ok(self.with(|t| {
            let mut hits: Vec<&(u64, Listing)> = t
                .listings
                .iter()
                .filter(|(_, l)| query.filter.all_of.iter().all(|c| matches(l, c)))
                .collect();
            hits.sort_by(|(sa, a), (sb, b)| {
                let order = compare(a, b, query.sort.field).then(sa.cmp(sb));
                match query.sort.direction {
                    Direction::Ascending => order,
                    Direction::Descending => order.reverse(),
                }
            });
            let total = hits.len() as i64;
            let page = hits
                .into_iter()
                .skip(query.offset() as usize)
                .take(query.limit as usize)
                .map(|(_, l)| l.clone())
                .collect();
            (page, total)
        }))
    }

    async fn update(&self, id: Uuid, patch: ListingPatch) -> anyhow::Result<Option<Listing>> {
        self.reachable()?;
        Ok(self.with(|t| {
            let (_, listing) = t.listings.iter_mut().find(|(_, l)| l.id == id)?;
            apply_patch(patch, listing);
            listing.updated_at = OffsetDateTime::now_utc();
            Some(listing.clone())
        }))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        self.reachable()?;
        Ok(self.with(|t| {
            let before = t.listings.len();
            t.listings.retain(|(_, l)| l.id != id);
            t.listings.len() != before
        }))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(&self, new: NewOrder) -> anyhow::Result<Order> {
        self.reachable()?;
        Ok(self.with(|t| {
            let order = Order {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                items: new.items,
                subtotal: new.subtotal,
                tax: new.tax,
                total: new.total,
                payment_method: new.payment_method,
                status: STATUS_PAID.to_string(),
                created_at: OffsetDateTime::now_utc(),
            };
            t.orders.push(order.clone());
            order
        }))
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Order>> {
        self.reachable()?;
        Ok(self.with(|t| {
            t.orders
                .iter()
                .rev()
                .filter(|o| o.user_id == user_id)
                .cloned()
                .collect()
        }))
    }
}

#[async_trait]
impl FreeShelfStore for MemoryStore {
    async fn create(&self, new: NewFreeShelfEntry) -> anyhow::Result<FreeShelfEntry> {
        self.reachable()?;
        Ok(self.with(|t| {
            let entry = FreeShelfEntry {
                id: Uuid::new_v4(),
                branch_id: new.branch_id,
                title: new.title,
                description: new.description,
                content: new.content,
                file_name: new.file_name,
                owner_id: new.owner_id,
                owner_name: new.owner_name,
                created_at: OffsetDateTime::now_utc(),
            };
            t.shelf.push(entry.clone());
            entry
        }))
    }

    async fn list(&self, branch_id: Option<&str>) -> anyhow::Result<Vec<FreeShelfEntry>> {
        self.reachable()?;
        Ok(self.with(|t| {
            t.shelf
                .iter()
                .rev()
                .filter(|e| branch_id.map_or(true, |b| e.branch_id == b))
                .cloned()
                .collect()
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<FreeShelfEntry>> {
        self.reachable()?;
        Ok(self.with(|t| t.shelf.iter().find(|e| e.id == id).cloned()))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        self.reachable()?;
        Ok(self.with(|t| {
            let before = t.shelf.len();
            t.shelf.retain(|e| e.id != id);
            t.shelf.len() != before
        }))
    }
}

// ---- collaborators ----

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

/// Object storage double. `failing()` refuses every upload.
#[derive(Default)]
pub struct FakeStorage {
    fail: bool,
    objects: Mutex<Vec<StoredObject>>,
}

impl FakeStorage {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("storage unavailable");
        }
        self.objects.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: body.len(),
        });
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }
}

#[derive(Default)]
pub struct RecordingEmail {
    fail: bool,
    sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp relay refused connection");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ---- driver ----

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub set_cookie: Option<String>,
}

impl TestResponse {
    /// `name=value` of the session cookie, ready for a `Cookie` header.
    pub fn session_cookie(&self) -> Option<String> {
        let pair = self.set_cookie.as_deref()?.split(';').next()?.trim();
        let value = pair.strip_prefix(SESSION_COOKIE)?.strip_prefix('=')?;
        (!value.is_empty()).then(|| pair.to_string())
    }
}

const BOUNDARY: &str = "campusshelf-test-boundary";

struct FormPart {
    name: String,
    file: Option<(String, String)>,
    body: Vec<u8>,
}

/// Builds a `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            file: None,
            body: value.as_bytes().to_vec(),
        });
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, body: &[u8]) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            file: Some((file_name.into(), content_type.into())),
            body: body.to_vec(),
        });
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match &part.file {
                Some((file_name, content_type)) => out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        part.name, file_name, content_type
                    )
                    .as_bytes(),
                ),
                None => out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name).as_bytes(),
                ),
            }
            out.extend_from_slice(&part.body);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        out
    }
}

#[derive(Default)]
pub struct TestAppBuilder {
    production: bool,
    failing_email: bool,
    failing_storage: bool,
}

impl TestAppBuilder {
    pub fn production(mut self) -> Self {
        self.production = true;
        self
    }

    pub fn failing_email(mut self) -> Self {
        self.failing_email = true;
        self
    }

    pub fn failing_storage(mut self) -> Self {
        self.failing_storage = true;
        self
    }

    pub fn build(self) -> TestApp {
        let mut config = test_config();
        if self.production {
            config.environment = Environment::Production;
        }
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(if self.failing_storage {
            FakeStorage::failing()
        } else {
            FakeStorage::default()
        });
        let email = Arc::new(RecordingEmail {
            fail: self.failing_email,
            ..Default::default()
        });

        let state = AppState {
            config: Arc::new(config),
            users: store.clone(),
            listings: store.clone(),
            orders: store.clone(),
            free_shelf: store.clone(),
            storage: Some(storage.clone() as Arc<dyn StorageClient>),
            email: email.clone(),
        };

        TestApp {
            router: build_app(state),
            store,
            storage,
            email,
        }
    }
}

pub struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    storage: Arc<FakeStorage>,
    email: Arc<RecordingEmail>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    pub async fn raw(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        content_type: &str,
        body: Vec<u8>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, content_type);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let request = builder.body(Body::from(body)).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            body,
            set_cookie,
        }
    }

    pub async fn json(&self, method: Method, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.raw(method, uri, cookie, "application/json", serde_json::to_vec(&body).unwrap())
            .await
    }

    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        form: MultipartForm,
    ) -> TestResponse {
        let content_type = format!("multipart/form-data; boundary={BOUNDARY}");
        self.raw(method, uri, cookie, &content_type, form.encode()).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send_empty(Method::GET, uri, cookie).await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send_empty(Method::DELETE, uri, cookie).await
    }

    async fn send_empty(&self, method: Method, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let request = builder.body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            body,
            set_cookie: None,
        }
    }

    /// Register an account and return its session cookie.
    pub async fn signup(&self, email: &str, name: &str) -> String {
        let res = self
            .json(
                Method::POST,
                "/api/auth/signup",
                None,
                serde_json::json!({ "email": email, "password": "secret1", "name": name, "college": "X" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "signup failed: {}", res.body);
        res.session_cookie().expect("signup sets a session cookie")
    }

    pub fn take_store_offline(&self) {
        self.store.go_offline();
    }

    pub async fn listing_count(&self) -> usize {
        self.store.with(|t| t.listings.len())
    }

    pub fn stored_objects(&self) -> Vec<StoredObject> {
        self.storage.objects()
    }

    pub fn sent_emails(&self) -> Vec<EmailMessage> {
        self.email.sent.lock().unwrap().clone()
    }

    pub async fn plant_reset_token(&self, email: &str, token: &str, expires: OffsetDateTime) {
        let user = self.store.find_by_email(email).await.unwrap().expect("user exists");
        self.store.set_reset_token(user.id, token, expires).await.unwrap();
    }

    pub async fn plant_verification_token(&self, email: &str, token: &str) {
        self.store.with(|t| {
            let user = t.users.iter_mut().find(|u| u.email == email).expect("user exists");
            user.email_verified = false;
            user.verification_token = Some(token.to_string());
        });
    }
}
