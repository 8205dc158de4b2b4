use std::fmt::{self, Write as _};

use crate::cache::Cache;
use crate::engine::{Engine, Joined};
use crate::error::Result;
use crate::schema::{
    PERMISSION_ACTION, PERMISSION_AUTHORIZED_RESOURCE_ID, PERMISSION_TABLE,
    PERMISSION_TARGET_RESOURCE_ID,
};
use crate::store::{Store, TransactionSource};
use crate::types::{Action, PermissionKey, ResourceId, validate_actions};
use tracing::{debug, instrument};

type Tx<S> = <S as TransactionSource>::Tx;

/// Filter criterion equivalent to [`Engine::has_permission`], meant to be
/// merged into the `WHERE` clause of a host query.
///
/// `E` is the host's expression for the target resource id of the row being
/// filtered, e.g. a column reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationPredicate<E> {
    /// Every row passes.
    Always,
    /// A row passes if a permission exists for `target`, one of `actions`
    /// and one of the `authorized` scope members.
    PermissionExists {
        /// Host expression for the target resource id.
        target: E,
        /// Accepted actions, in caller order.
        actions: Vec<Action>,
        /// Authorization scope of the checked resource.
        authorized: Vec<ResourceId>,
    },
}

/// Bind value of a rendered [`SqlFragment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// A resource id.
    Resource(ResourceId),
    /// An action name.
    Action(Action),
}

/// SQL text with numbered placeholders and their bind values in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    /// SQL text.
    pub sql: String,
    /// Values for `$n` placeholders, in placeholder order.
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    fn constant(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }
}

impl<E> AuthorizationPredicate<E> {
    /// Returns whether the predicate accepts every row.
    pub fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }

    /// Evaluates the predicate for a row whose target expression evaluates
    /// to `target`, using `row_exists` to probe the permission table.
    pub fn matches<F>(&self, target: ResourceId, mut row_exists: F) -> bool
    where
        F: FnMut(&PermissionKey) -> bool,
    {
        let Self::PermissionExists {
            actions,
            authorized,
            ..
        } = self
        else {
            return true;
        };
        actions.iter().any(|action| {
            authorized.iter().any(|member| {
                row_exists(&PermissionKey::new(*member, target, action.clone()))
            })
        })
    }

    /// Renders the predicate as a correlated `EXISTS` sub-query.
    ///
    /// Placeholders are numbered from `first_placeholder`; single values are
    /// compared with `=` and lists with `IN`. An empty action or scope list
    /// renders `FALSE`.
    pub fn to_sql(&self, first_placeholder: usize) -> SqlFragment
    where
        E: fmt::Display,
    {
        let Self::PermissionExists {
            target,
            actions,
            authorized,
        } = self
        else {
            return SqlFragment::constant("TRUE");
        };
        // No action or no scope member can ever match.
        if actions.is_empty() || authorized.is_empty() {
            return SqlFragment::constant("FALSE");
        }

        let mut sql = format!(
            "EXISTS (SELECT 1 FROM {PERMISSION_TABLE} WHERE \
             {PERMISSION_TABLE}.{PERMISSION_TARGET_RESOURCE_ID} = {target} AND "
        );
        let mut params = Vec::with_capacity(actions.len() + authorized.len());
        let mut next = first_placeholder;

        push_comparison(
            &mut sql,
            &mut params,
            &mut next,
            PERMISSION_ACTION,
            actions.iter().cloned().map(SqlValue::Action),
        );
        sql.push_str(" AND ");
        push_comparison(
            &mut sql,
            &mut params,
            &mut next,
            PERMISSION_AUTHORIZED_RESOURCE_ID,
            authorized.iter().copied().map(SqlValue::Resource),
        );
        sql.push(')');

        SqlFragment { sql, params }
    }
}

fn push_comparison(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    next: &mut usize,
    column: &str,
    values: impl ExactSizeIterator<Item = SqlValue>,
) {
    let single = values.len() == 1;
    let placeholders: Vec<String> = values
        .map(|value| {
            params.push(value);
            let placeholder = format!("${next}");
            *next += 1;
            placeholder
        })
        .collect();

    // Writing into a String cannot fail.
    let _ = if single {
        write!(sql, "{PERMISSION_TABLE}.{column} = {}", placeholders[0])
    } else {
        write!(
            sql,
            "{PERMISSION_TABLE}.{column} IN ({})",
            placeholders.join(", ")
        )
    };
}

impl<S, C> Engine<S, C>
where
    S: Store,
    C: Cache,
{
    /// Builds a filter criterion that holds exactly for the target rows on
    /// which [`Engine::has_permission`] would return `true`.
    ///
    /// The scope of `authorized` is resolved once here; the host query then
    /// evaluates the criterion for all candidate rows. Actions are validated
    /// before the system-resource bypass, as in [`Engine::has_permission`].
    #[instrument(
        level = "debug",
        skip_all,
        fields(authorized = %authorized, actions = actions.len())
    )]
    pub async fn authorization_predicate<E, A>(
        &self,
        authorized: ResourceId,
        target: E,
        actions: &[A],
    ) -> Result<AuthorizationPredicate<E>>
    where
        A: AsRef<str>,
    {
        self.build_predicate(authorized, target, actions, None).await
    }

    pub(crate) async fn build_predicate<E, A>(
        &self,
        authorized: ResourceId,
        target: E,
        actions: &[A],
        ambient: Option<&mut Tx<S>>,
    ) -> Result<AuthorizationPredicate<E>>
    where
        A: AsRef<str>,
    {
        let actions = validate_actions(actions)?;
        if authorized == self.system_resource {
            return Ok(AuthorizationPredicate::Always);
        }

        let scope = self.resolve_scope(authorized, ambient).await?;
        if scope.contains(self.system_resource) {
            debug!("scope includes system resource");
            return Ok(AuthorizationPredicate::Always);
        }

        Ok(AuthorizationPredicate::PermissionExists {
            target,
            actions,
            authorized: scope.into_vec(),
        })
    }
}

impl<S, C> Joined<'_, S, C>
where
    S: Store,
    C: Cache,
{
    /// See [`Engine::authorization_predicate`].
    pub async fn authorization_predicate<E, A>(
        &mut self,
        authorized: ResourceId,
        target: E,
        actions: &[A],
    ) -> Result<AuthorizationPredicate<E>>
    where
        A: AsRef<str>,
    {
        self.engine
            .build_predicate(authorized, target, actions, Some(&mut *self.tx))
            .await
    }
}
