use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    domain::slug,
    dto::categories::{CategoryNode, CategoryTree, CreateCategoryRequest, UpdateCategoryRequest},
    entity::{
        categories::{ActiveModel, Column, Entity as Categories, Model as CategoryModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Category,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Nests a flat category list by `parent_id`. Rows whose parent is missing
/// become roots.
pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let known: std::collections::HashSet<Uuid> = categories.iter().map(|c| c.id).collect();
    let mut children: HashMap<Option<Uuid>, Vec<Category>> = HashMap::new();
    for category in categories {
        let parent = category.parent_id.filter(|p| known.contains(p));
        children.entry(parent).or_default().push(category);
    }

    fn attach(
        parent: Option<Uuid>,
        children: &mut HashMap<Option<Uuid>, Vec<Category>>,
    ) -> Vec<CategoryNode> {
        let Some(level) = children.remove(&parent) else {
            return Vec::new();
        };
        level
            .into_iter()
            .map(|category| {
                let id = category.id;
                CategoryNode {
                    category,
                    children: attach(Some(id), children),
                }
            })
            .collect()
    }

    attach(None, &mut children)
}

/// True when making `parent` the parent of `id` would close a loop.
pub fn creates_cycle(id: Uuid, parent: Uuid, parents: &HashMap<Uuid, Option<Uuid>>) -> bool {
    let mut cursor = Some(parent);
    let mut steps = 0;
    while let Some(current) = cursor {
        if current == id || steps > parents.len() {
            return true;
        }
        cursor = parents.get(&current).copied().flatten();
        steps += 1;
    }
    false
}

pub async fn list_tree(
    state: &AppState,
    viewer: Option<&AuthUser>,
) -> AppResult<ApiResponse<CategoryTree>> {
    let mut finder = Categories::find().order_by_asc(Column::Name);
    if !viewer.is_some_and(AuthUser::is_admin) {
        finder = finder.filter(Column::IsActive.eq(true));
    }
    let categories: Vec<Category> = finder
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();
    let total = categories.len() as i64;

    Ok(ApiResponse::success(
        "Categories",
        CategoryTree {
            items: build_tree(categories),
        },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn get_by_slug(state: &AppState, slug: &str) -> AppResult<ApiResponse<CategoryNode>> {
    let category = Categories::find()
        .filter(Column::Slug.eq(slug.to_ascii_lowercase()))
        .filter(Column::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Category"))?;

    let children = Categories::find()
        .filter(Column::ParentId.eq(category.id))
        .filter(Column::IsActive.eq(true))
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|c| CategoryNode {
            category: c.into(),
            children: Vec::new(),
        })
        .collect();

    Ok(ApiResponse::success(
        "Category",
        CategoryNode {
            category: category.into(),
            children,
        },
        None,
    ))
}

async fn unique_slug<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<String> {
    slug::first_free(name, |candidate| async move {
        let mut finder = Categories::find().filter(Column::Slug.eq(candidate));
        if let Some(id) = exclude {
            finder = finder.filter(Column::Id.ne(id));
        }
        Ok::<_, AppError>(finder.count(conn).await? > 0)
    })
    .await
}

async fn parent_map<C: ConnectionTrait>(conn: &C) -> AppResult<HashMap<Uuid, Option<Uuid>>> {
    Ok(Categories::find()
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c.parent_id))
        .collect())
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    if let Some(parent) = payload.parent_id {
        Categories::find_by_id(parent)
            .one(&state.orm)
            .await?
            .ok_or(AppError::NotFound("Parent category"))?;
    }

    let category = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        slug: Set(unique_slug(&state.orm, &payload.name, None).await?),
        description: Set(payload.description),
        parent_id: Set(payload.parent_id),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::on_unique_violation(e, "Category slug already exists"))?;

    audit::record(
        state,
        Some(user.user_id),
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category created",
        category.into(),
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let existing: CategoryModel = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Category"))?;

    let mut active: ActiveModel = existing.clone().into();
    if payload.clear_parent.unwrap_or(false) {
        active.parent_id = Set(None);
    } else if let Some(parent) = payload.parent_id {
        let parents = parent_map(&state.orm).await?;
        if !parents.contains_key(&parent) {
            return Err(AppError::NotFound("Parent category"));
        }
        if creates_cycle(id, parent, &parents) {
            return Err(AppError::BadRequest(
                "A category cannot be its own ancestor".into(),
            ));
        }
        active.parent_id = Set(Some(parent));
    }
    if let Some(name) = payload.name.filter(|n| !n.trim().is_empty()) {
        if name.trim() != existing.name {
            active.slug = Set(unique_slug(&state.orm, &name, Some(id)).await?);
        }
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    let category = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "category_update",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success("Updated", category.into(), Some(Meta::empty())))
}

/// Refuses to delete a category that still has children or products.
pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let children = Categories::find()
        .filter(Column::ParentId.eq(id))
        .count(&state.orm)
        .await?;
    let products = Products::find()
        .filter(ProdCol::CategoryId.eq(id))
        .count(&state.orm)
        .await?;
    if children > 0 || products > 0 {
        return Err(AppError::Conflict(
            "Category still has subcategories or products".into(),
        ));
    }

    let result = Categories::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Category"));
    }

    audit::record(
        state,
        Some(user.user_id),
        "category_delete",
        "categories",
        serde_json::json!({ "category_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn category(name: &str, parent: Option<Uuid>) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: slug::slugify(name),
            description: None,
            parent_id: parent,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tree_nests_children_and_promotes_orphans() {
        let coffee = category("Cà phê", None);
        let beans = category("Hạt rang", Some(coffee.id));
        let orphan = category("Trà", Some(Uuid::new_v4()));
        let tree = build_tree(vec![beans.clone(), coffee.clone(), orphan.clone()]);

        assert_eq!(tree.len(), 2);
        let root = tree.iter().find(|n| n.category.id == coffee.id).unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].category.id, beans.id);
        assert!(tree.iter().any(|n| n.category.id == orphan.id));
    }

    #[test]
    fn detects_ancestor_loops() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let parents = HashMap::from([(a, None), (b, Some(a)), (c, Some(b))]);

        assert!(creates_cycle(a, c, &parents));
        assert!(creates_cycle(a, a, &parents));
        assert!(!creates_cycle(c, a, &parents));
    }
}
