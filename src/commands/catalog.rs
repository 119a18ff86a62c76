use crate::db::{Category, Product, ProductFlavor, ProductOption};
use crate::error::{FornadaError, FornadaResult};
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::error::ErrorKind;
use uuid::Uuid;

const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// URL-safe slug: lowercase, spaces to hyphens, everything else stripped.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

pub async fn get_categories(State(state): State<AppState>) -> FornadaResult<Json<Vec<Category>>> {
    let categories =
        sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
            .fetch_all(&state.pool)
            .await?;
    Ok(Json(categories))
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> FornadaResult<Json<Value>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(FornadaError::Validation(
            "Category name is required.".to_string(),
        ));
    }

    let result = sqlx::query_as::<_, (Uuid,)>(
        "INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(slugify(name))
    .fetch_one(&state.pool)
    .await;

    match result {
        Ok((id,)) => Ok(Json(json!({ "success": true, "id": id }))),
        Err(sqlx::Error::Database(e)) if e.kind() == ErrorKind::UniqueViolation => Err(
            FornadaError::Conflict("A category with this name already exists.".to_string()),
        ),
        Err(e) => Err(e.into()),
    }
}

/// Deletion is blocked while any product still references the category; the
/// error names the count so staff know what to clean up.
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> FornadaResult<Json<Value>> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM products WHERE category_id = $1")
            .bind(id)
            .fetch_one(&state.pool)
            .await?;

    if count > 0 {
        return Err(FornadaError::Conflict(format!(
            "This category has {} products. Remove them first.",
            count
        )));
    }

    sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({ "success": true })))
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub category_name: String,
    pub effective_price: Decimal,
    pub options: Vec<ProductOption>,
    pub flavors: Vec<ProductFlavor>,
}

async fn load_product_views(
    pool: &crate::db::DbPool,
    only_available: bool,
) -> FornadaResult<Vec<ProductView>> {
    let sql = if only_available {
        "SELECT * FROM products WHERE is_available ORDER BY created_at DESC"
    } else {
        "SELECT * FROM products ORDER BY created_at DESC"
    };
    let products = sqlx::query_as::<_, Product>(sql).fetch_all(pool).await?;

    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let options = sqlx::query_as::<_, ProductOption>(
        "SELECT * FROM product_options WHERE product_id = ANY($1) ORDER BY name",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;
    let flavors = sqlx::query_as::<_, ProductFlavor>(
        "SELECT * FROM product_flavors WHERE product_id = ANY($1) ORDER BY name",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;
    let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories")
        .fetch_all(pool)
        .await?;

    let views = products
        .into_iter()
        .map(|product| {
            let category_name = categories
                .iter()
                .find(|c| c.id == product.category_id)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            let effective_price = product.effective_price();
            ProductView {
                category_name,
                effective_price,
                options: options
                    .iter()
                    .filter(|o| o.product_id == product.id)
                    .cloned()
                    .collect(),
                flavors: flavors
                    .iter()
                    .filter(|f| f.product_id == product.id)
                    .cloned()
                    .collect(),
                product,
            }
        })
        .collect();

    Ok(views)
}

/// Storefront listing: available products only.
pub async fn get_storefront_products(
    State(state): State<AppState>,
) -> FornadaResult<Json<Vec<ProductView>>> {
    let views = load_product_views(&state.pool, true).await?;
    Ok(Json(views))
}

/// Admin listing: everything, including hidden products.
pub async fn get_products_admin(
    State(state): State<AppState>,
) -> FornadaResult<Json<Vec<ProductView>>> {
    let views = load_product_views(&state.pool, false).await?;
    Ok(Json(views))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> FornadaResult<Json<ProductView>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| FornadaError::Validation("Product not found.".to_string()))?;

    let options = sqlx::query_as::<_, ProductOption>(
        "SELECT * FROM product_options WHERE product_id = $1 ORDER BY name",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;
    let flavors = sqlx::query_as::<_, ProductFlavor>(
        "SELECT * FROM product_flavors WHERE product_id = $1 ORDER BY name",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;
    let category_name: Option<(String,)> =
        sqlx::query_as("SELECT name FROM categories WHERE id = $1")
            .bind(product.category_id)
            .fetch_optional(&state.pool)
            .await?;

    let effective_price = product.effective_price();
    Ok(Json(ProductView {
        category_name: category_name.map(|r| r.0).unwrap_or_default(),
        effective_price,
        options,
        flavors,
        product,
    }))
}

#[derive(Debug, Deserialize)]
struct ChildInput {
    name: String,
    price: Decimal,
}

#[derive(Debug, Default)]
struct ProductForm {
    name: Option<String>,
    description: Option<String>,
    price: Option<Decimal>,
    promo_price: Option<Decimal>,
    category_id: Option<Uuid>,
    options: Vec<ChildInput>,
    flavors: Vec<ChildInput>,
    image: Option<(String, Vec<u8>)>,
}

/// Parses the admin product form: scalar fields, JSON-encoded child arrays,
/// and an optional image file.
async fn parse_product_form(mut multipart: Multipart) -> FornadaResult<ProductForm> {
    let mut form = ProductForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("image.png").to_string();
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                if bytes.len() > MAX_IMAGE_BYTES {
                    return Err(FornadaError::Validation(
                        "Image exceeds the 5MB limit.".to_string(),
                    ));
                }
                form.image = Some((file_name, bytes.to_vec()));
            }
            other => {
                let text = field.text().await?;
                let trimmed = text.trim();
                match other {
                    "name" => form.name = Some(trimmed.to_string()),
                    "description" if !trimmed.is_empty() => {
                        form.description = Some(trimmed.to_string())
                    }
                    "price" => {
                        form.price = Some(trimmed.parse().map_err(|_| {
                            FornadaError::Validation("Invalid price.".to_string())
                        })?)
                    }
                    "promoPrice" if !trimmed.is_empty() => {
                        form.promo_price = Some(trimmed.parse().map_err(|_| {
                            FornadaError::Validation("Invalid promo price.".to_string())
                        })?)
                    }
                    "categoryId" => {
                        form.category_id = Some(trimmed.parse().map_err(|_| {
                            FornadaError::Validation("Invalid category.".to_string())
                        })?)
                    }
                    "options" if !trimmed.is_empty() => form.options = serde_json::from_str(trimmed)?,
                    "flavors" if !trimmed.is_empty() => form.flavors = serde_json::from_str(trimmed)?,
                    _ => {}
                }
            }
        }
    }

    Ok(form)
}

fn upload_dir() -> std::path::PathBuf {
    std::env::var("UPLOAD_DIR")
        .unwrap_or_else(|_| "uploads".to_string())
        .into()
}

/// Writes the image under the upload dir and returns the public URL.
fn save_image(file_name: &str, bytes: &[u8]) -> FornadaResult<String> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_lowercase();
    if !matches!(extension.as_str(), "png" | "jpg" | "jpeg" | "webp") {
        return Err(FornadaError::Validation(
            "Unsupported image format.".to_string(),
        ));
    }

    let dir = upload_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    let stored_name = format!(
        "product_{}_{}.{}",
        chrono::Utc::now().timestamp(),
        Uuid::new_v4().to_string().split_at(8).0,
        extension
    );
    std::fs::write(dir.join(&stored_name), bytes)?;
    Ok(format!("/uploads/{}", stored_name))
}

fn validate_product_form(form: &ProductForm) -> FornadaResult<(String, Decimal, Uuid)> {
    let name = form
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| FornadaError::Validation("Product name is required.".to_string()))?;
    let price = form
        .price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| FornadaError::Validation("A positive price is required.".to_string()))?;
    let category_id = form
        .category_id
        .ok_or_else(|| FornadaError::Validation("Category is required.".to_string()))?;
    Ok((name.to_string(), price, category_id))
}

pub async fn create_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> FornadaResult<Json<Value>> {
    let form = parse_product_form(multipart).await?;
    let (name, price, category_id) = validate_product_form(&form)?;

    let image_url = match &form.image {
        Some((file_name, bytes)) => Some(save_image(file_name, bytes)?),
        None => None,
    };

    let mut tx = state.pool.begin().await?;

    let (product_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO products (name, description, price, promo_price, image_url, category_id, is_available)
         VALUES ($1, $2, $3, $4, $5, $6, TRUE) RETURNING id",
    )
    .bind(&name)
    .bind(&form.description)
    .bind(price)
    .bind(form.promo_price)
    .bind(&image_url)
    .bind(category_id)
    .fetch_one(&mut *tx)
    .await?;

    insert_children(&mut tx, product_id, &form.options, &form.flavors).await?;

    tx.commit().await?;

    tracing::info!("Created product {} ({})", name, product_id);
    Ok(Json(json!({ "success": true, "id": product_id })))
}

/// Update replaces the option/flavor children wholesale. Historical order
/// items are unaffected: they snapshot name and price, not a child row id.
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> FornadaResult<Json<Value>> {
    let form = parse_product_form(multipart).await?;
    let (name, price, category_id) = validate_product_form(&form)?;

    let existing = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| FornadaError::Validation("Product not found.".to_string()))?;

    let image_url = match &form.image {
        Some((file_name, bytes)) => Some(save_image(file_name, bytes)?),
        None => existing.image_url,
    };

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "UPDATE products SET name = $1, description = $2, price = $3, promo_price = $4,
         image_url = $5, category_id = $6 WHERE id = $7",
    )
    .bind(&name)
    .bind(&form.description)
    .bind(price)
    .bind(form.promo_price)
    .bind(&image_url)
    .bind(category_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM product_options WHERE product_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM product_flavors WHERE product_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_children(&mut tx, id, &form.options, &form.flavors).await?;

    tx.commit().await?;
    Ok(Json(json!({ "success": true })))
}

async fn insert_children(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    product_id: Uuid,
    options: &[ChildInput],
    flavors: &[ChildInput],
) -> FornadaResult<()> {
    for option in options {
        sqlx::query("INSERT INTO product_options (product_id, name, price) VALUES ($1, $2, $3)")
            .bind(product_id)
            .bind(&option.name)
            .bind(option.price)
            .execute(&mut **tx)
            .await?;
    }
    for flavor in flavors {
        sqlx::query("INSERT INTO product_flavors (product_id, name, price) VALUES ($1, $2, $3)")
            .bind(product_id)
            .bind(&flavor.name)
            .bind(flavor.price)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Hides or shows the product on the storefront without deleting it.
pub async fn toggle_product_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> FornadaResult<Json<Value>> {
    let updated = sqlx::query("UPDATE products SET is_available = NOT is_available WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if updated.rows_affected() == 0 {
        return Err(FornadaError::Validation("Product not found.".to_string()));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> FornadaResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(_) => Ok(Json(json!({ "success": true }))),
        Err(sqlx::Error::Database(e)) if e.kind() == ErrorKind::ForeignKeyViolation => {
            Err(FornadaError::Conflict(
                "This product appears in existing orders. Hide it instead of deleting.".to_string(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}
