//! Declarative access policy
//!
//! Role grants are plain configuration, loaded once at start-up and handed to
//! the calling layer. Ledger services never consult the policy; they receive an
//! already-authorized actor and a tenant id.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Operation a role may be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "materials.view")]
    ViewMaterials,
    #[serde(rename = "materials.manage")]
    ManageMaterials,
    #[serde(rename = "movements.view")]
    ViewMovements,
    #[serde(rename = "movements.post")]
    PostMovements,
    #[serde(rename = "movements.amend")]
    AmendMovements,
    #[serde(rename = "products.view")]
    ViewProducts,
    #[serde(rename = "products.manage")]
    ManageProducts,
    #[serde(rename = "recipes.view")]
    ViewRecipes,
    #[serde(rename = "recipes.manage")]
    ManageRecipes,
    #[serde(rename = "production.view")]
    ViewProduction,
    #[serde(rename = "production.create")]
    CreateProduction,
    #[serde(rename = "production.execute")]
    ExecuteProduction,
    #[serde(rename = "lots.view")]
    ViewLots,
    #[serde(rename = "sales.view")]
    ViewSales,
    #[serde(rename = "sales.create")]
    CreateSales,
    #[serde(rename = "sales.confirm")]
    ConfirmSales,
}

/// Permissions granted to one role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    /// Grants every permission
    #[serde(default)]
    pub all: bool,

    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl RoleGrant {
    fn of(permissions: &[Permission]) -> Self {
        Self {
            all: false,
            permissions: permissions.iter().copied().collect(),
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.all || self.permissions.contains(&permission)
    }
}

/// Role name to grant mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub roles: BTreeMap<String, RoleGrant>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl AccessPolicy {
    /// Built-in roles used when the configuration does not define any
    pub fn standard() -> Self {
        use Permission::*;

        let mut roles = BTreeMap::new();
        roles.insert(
            "administrator".to_string(),
            RoleGrant {
                all: true,
                permissions: BTreeSet::new(),
            },
        );
        roles.insert(
            "supplier".to_string(),
            RoleGrant::of(&[
                ViewMaterials,
                ManageMaterials,
                ViewMovements,
                PostMovements,
                ViewProducts,
                ViewRecipes,
                ViewProduction,
                CreateProduction,
                ExecuteProduction,
            ]),
        );
        roles.insert(
            "monitor".to_string(),
            RoleGrant::of(&[
                ViewMaterials,
                ViewMovements,
                ViewProducts,
                ViewRecipes,
                ViewProduction,
                ViewLots,
            ]),
        );
        roles.insert(
            "seller".to_string(),
            RoleGrant::of(&[ViewMaterials, ViewProducts, ViewLots, ViewSales, CreateSales, ConfirmSales]),
        );

        Self { roles }
    }

    /// Whether `role` holds `permission`. Unknown roles hold nothing.
    pub fn allows(&self, role: &str, permission: Permission) -> bool {
        self.roles
            .get(&role.trim().to_lowercase())
            .is_some_and(|grant| grant.allows(permission))
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}
