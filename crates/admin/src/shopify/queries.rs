//! GraphQL documents sent by the jobs and fetchers.

// =============================================================================
// Mutations
// =============================================================================

pub const TRANSLATIONS_REGISTER: &str = r"
mutation translationsRegister($resourceId: ID!, $translations: [TranslationInput!]!) {
  translationsRegister(resourceId: $resourceId, translations: $translations) {
    translations {
      key
      locale
      value
    }
    userErrors {
      code
      field
      message
    }
  }
}
";

pub const TAGS_ADD: &str = r"
mutation tagsAdd($id: ID!, $tags: [String!]!) {
  tagsAdd(id: $id, tags: $tags) {
    node {
      id
    }
    userErrors {
      field
      message
    }
  }
}
";

pub const PRODUCT_UPDATE_HANDLE: &str = r"
mutation productUpdate($product: ProductUpdateInput!) {
  productUpdate(product: $product) {
    product {
      id
      handle
    }
    userErrors {
      field
      message
    }
  }
}
";

pub const PRODUCT_UPDATE_SEO: &str = r"
mutation productUpdateSeo($product: ProductUpdateInput!) {
  productUpdate(product: $product) {
    product {
      id
      seo {
        title
        description
      }
    }
    userErrors {
      field
      message
    }
  }
}
";

pub const PRODUCT_UPDATE_METAFIELDS: &str = r"
mutation productUpdateMetafields($product: ProductUpdateInput!) {
  productUpdate(product: $product) {
    product {
      id
    }
    userErrors {
      field
      message
    }
  }
}
";

pub const PRODUCT_ADD_MEDIA: &str = r"
mutation productAddMedia($product: ProductUpdateInput!, $media: [CreateMediaInput!]) {
  productUpdate(product: $product, media: $media) {
    product {
      id
    }
    userErrors {
      field
      message
    }
  }
}
";

pub const PRODUCT_REORDER_MEDIA: &str = r"
mutation productReorderMedia($id: ID!, $moves: [MoveInput!]!) {
  productReorderMedia(id: $id, moves: $moves) {
    job {
      id
    }
    mediaUserErrors {
      field
      message
    }
  }
}
";

pub const COLLECTION_UPDATE: &str = r"
mutation collectionUpdate($input: CollectionInput!) {
  collectionUpdate(input: $input) {
    collection {
      id
      handle
    }
    userErrors {
      field
      message
    }
  }
}
";

pub const CUSTOMER_DELETE: &str = r"
mutation customerDelete($input: CustomerDeleteInput!) {
  customerDelete(input: $input) {
    deletedCustomerId
    userErrors {
      field
      message
    }
  }
}
";

pub const ORDER_DELETE: &str = r"
mutation orderDelete($orderId: ID!) {
  orderDelete(orderId: $orderId) {
    deletedId
    userErrors {
      field
      message
    }
  }
}
";

// =============================================================================
// Paginated queries
// =============================================================================

pub const TRANSLATABLE_RESOURCES: &str = r"
query getTranslatableResources($resourceType: TranslatableResourceType!, $first: Int!, $after: String) {
  translatableResources(first: $first, after: $after, resourceType: $resourceType) {
    nodes {
      resourceId
      translatableContent {
        digest
        key
        locale
        value
      }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
";

pub const CUSTOMERS: &str = r"
query getCustomers($first: Int!, $after: String) {
  customers(first: $first, after: $after) {
    nodes {
      id
      defaultEmailAddress {
        emailAddress
      }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
";

pub const ORDERS: &str = r"
query getOrders($first: Int!, $after: String) {
  orders(first: $first, after: $after) {
    nodes {
      id
      email
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
";

pub const PRODUCT_MEDIA: &str = r"
query getProductMedia($first: Int!, $after: String) {
  products(first: $first, after: $after) {
    nodes {
      id
      media(first: 40) {
        nodes {
          id
          mediaContentType
        }
      }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
";

pub const PRODUCTS: &str = r"
query getProducts($first: Int!, $after: String) {
  products(first: $first, after: $after) {
    nodes {
      id
      variants(first: 1) {
        nodes {
          sku
        }
      }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
";
