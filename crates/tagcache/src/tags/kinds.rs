//! Built-in entity kinds of the survey product.
//!
//! Tag strings are part of the shared cache's contract: every instance must
//! render the same tag for the same ids, so changing a template here requires
//! a full cache flush on deploy.

use super::engine::{EntityKind, TagTemplate as T};

pub static RESPONSE: EntityKind = EntityKind::new(
    "response",
    &[
        T::new("responses-{id}"),
        T::new("environments-{environmentId}-responses"),
        T::new("contacts-{contactId}-responses"),
        T::new("surveys-{surveyId}-singleUse-{singleUseId}-responses"),
        T::new("surveys-{surveyId}-responses"),
    ],
);

pub static SURVEY: EntityKind = EntityKind::new(
    "survey",
    &[
        T::new("surveys-{id}"),
        T::new("environments-{environmentId}-surveys"),
        T::new("actionClasses-{actionClassId}-surveys"),
        T::new("segments-{segmentId}-surveys"),
        T::new("surveys-resultShare-{resultShareKey}"),
    ],
);

pub static DISPLAY: EntityKind = EntityKind::new(
    "display",
    &[
        T::new("displays-{id}"),
        T::new("surveys-{surveyId}-displays"),
        T::new("contacts-{contactId}-displays"),
    ],
);

pub static RESPONSE_NOTE: EntityKind = EntityKind::new(
    "responseNote",
    &[
        T::new("responseNotes-{id}"),
        T::new("responses-{responseId}-responseNote"),
    ],
);

pub static ENVIRONMENT: EntityKind = EntityKind::new(
    "environment",
    &[
        T::new("environments-{id}"),
        T::new("projects-{projectId}-environments"),
    ],
);

pub static PROJECT: EntityKind = EntityKind::new(
    "project",
    &[
        T::new("projects-{id}"),
        T::new("organizations-{organizationId}-projects"),
        T::new("users-{userId}-projects"),
    ],
);

pub static ORGANIZATION: EntityKind = EntityKind::new(
    "organization",
    &[
        T::new("organizations-{id}"),
        T::new("users-{userId}-organizations"),
    ],
);

pub static USER: EntityKind = EntityKind::new(
    "user",
    &[T::new("users-{id}"), T::new("users-{email}-user")],
);

pub static CONTACT: EntityKind = EntityKind::new(
    "contact",
    &[
        T::new("contacts-{id}"),
        T::new("environments-{environmentId}-contacts"),
        T::new("environments-{environmentId}-contactId-{userId}"),
    ],
);

pub static CONTACT_ATTRIBUTE: EntityKind = EntityKind::new(
    "contactAttribute",
    &[
        T::new("contactAttributes-{id}"),
        T::new("contactAttributes-environment-{environmentId}"),
        T::new("contactAttributes-contact-{contactId}"),
        T::new("contactAttributes-key-{key}"),
    ],
);

pub static ACTION_CLASS: EntityKind = EntityKind::new(
    "actionClass",
    &[
        T::new("actionClasses-{id}"),
        T::new("environments-{environmentId}-actionClasses"),
        T::new("environments-{environmentId}-name-{name}-actionClasses"),
    ],
);

pub static WEBHOOK: EntityKind = EntityKind::new(
    "webhook",
    &[
        T::new("webhooks-{id}"),
        T::new("environments-{environmentId}-webhooks"),
        T::new("sources-{source}-environments-{environmentId}-webhooks"),
    ],
);

pub static API_KEY: EntityKind = EntityKind::new(
    "apiKey",
    &[
        T::new("apiKeys-{id}"),
        T::new("apiKeys-{hashedKey}-apiKey"),
        T::new("organizations-{organizationId}-apiKeys"),
    ],
);

pub static INTEGRATION: EntityKind = EntityKind::new(
    "integration",
    &[
        T::new("integrations-{id}"),
        T::new("environments-{environmentId}-integrations"),
        T::new("environments-{environmentId}-type-{type}-integrations"),
    ],
);

pub static SEGMENT: EntityKind = EntityKind::new(
    "segment",
    &[
        T::new("segments-{id}"),
        T::new("environments-{environmentId}-segments"),
        T::new("attributeKeys-{attributeKey}-segments"),
    ],
);

pub static TAG: EntityKind = EntityKind::new(
    "tag",
    &[
        T::new("tags-{id}"),
        T::new("environments-{environmentId}-tags"),
    ],
);

pub static TEAM: EntityKind = EntityKind::new(
    "team",
    &[
        T::new("team-{id}"),
        T::new("users-{userId}-teams"),
        T::new("organizations-{organizationId}-teams"),
        T::new("projects-{projectId}-teams"),
    ],
);

pub static INVITE: EntityKind = EntityKind::new(
    "invite",
    &[
        T::new("invites-{id}"),
        T::new("organizations-{organizationId}-invites"),
    ],
);

pub static MEMBERSHIP: EntityKind = EntityKind::new(
    "membership",
    &[
        T::new("users-{userId}-memberships"),
        T::new("organizations-{organizationId}-memberships"),
    ],
);

/// Every built-in kind, registered by [`super::TagRegistry::new`].
pub static BUILTIN: &[&EntityKind] = &[
    &RESPONSE,
    &SURVEY,
    &DISPLAY,
    &RESPONSE_NOTE,
    &ENVIRONMENT,
    &PROJECT,
    &ORGANIZATION,
    &USER,
    &CONTACT,
    &CONTACT_ATTRIBUTE,
    &ACTION_CLASS,
    &WEBHOOK,
    &API_KEY,
    &INTEGRATION,
    &SEGMENT,
    &TAG,
    &TEAM,
    &INVITE,
    &MEMBERSHIP,
];
