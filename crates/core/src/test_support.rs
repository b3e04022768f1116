//! In-memory fixtures shared by unit tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub struct ZipBuilder {
    zip: ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    pub fn file(self, name: &str, content: impl AsRef<[u8]>) -> Self {
        let mut zip = self.zip;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_ref()).unwrap();
        Self { zip }
    }

    pub fn finish(self) -> Vec<u8> {
        self.zip.finish().unwrap().into_inner()
    }
}

pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#;

pub const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

pub fn chapter_xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>{title}</title></head>
<body>{body}</body>
</html>"#
    )
}

/// EPUB3 book with package under `OEBPS/`, a nav document under
/// `OEBPS/nav/` (a different base directory), nested TOC, cover and an image.
pub fn epub3_book() -> Vec<u8> {
    let opf = r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="3.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:title>The Lighthouse Keeper</dc:title>
        <dc:title>Ignored Subtitle</dc:title>
        <dc:creator>Ada Marsh</dc:creator>
        <dc:creator>Second Author</dc:creator>
        <dc:language>en</dc:language>
    </metadata>
    <manifest>
        <item id="nav" href="nav/toc.xhtml" media-type="application/xhtml+xml" properties="nav"/>
        <item id="cover-img" href="Images/cover.jpg" media-type="image/jpeg" properties="cover-image"/>
        <item id="fig1" href="Images/figure%201.png" media-type="image/png"/>
        <item id="ch1" href="Text/ch1.xhtml" media-type="application/xhtml+xml"/>
        <item id="ch2" href="Text/ch2.xhtml" media-type="application/xhtml+xml"/>
        <item id="ch3" href="Text/ch3.xhtml" media-type="application/xhtml+xml"/>
    </manifest>
    <spine>
        <itemref idref="ch1"/>
        <itemref idref="ch2"/>
        <itemref idref="ch3"/>
    </spine>
</package>"#;

    let nav = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Contents</title></head>
<body>
  <nav epub:type="landmarks"><ol><li><a href="../Text/ch3.xhtml">Landmark</a></li></ol></nav>
  <nav epub:type="toc" id="toc">
    <h1>Contents</h1>
    <ol>
      <li><a href="../Text/ch1.xhtml">Part One</a>
        <ol>
          <li><a href="../Text/ch1.xhtml#arrival">  The
              Arrival </a></li>
          <li><a href="../Text/ch2.xhtml">The Storm</a></li>
        </ol>
      </li>
      <li><a href="../Text/ch3.xhtml">Part Two</a></li>
    </ol>
  </nav>
</body>
</html>"#;

    ZipBuilder::new()
        .file("mimetype", "application/epub+zip")
        .file("META-INF/container.xml", CONTAINER_XML)
        .file("OEBPS/content.opf", opf)
        .file("OEBPS/nav/toc.xhtml", nav)
        .file("OEBPS/Images/cover.jpg", JPEG_HEADER)
        .file("OEBPS/Images/figure 1.png", b"\x89PNG\r\n\x1a\nfake")
        .file(
            "OEBPS/Text/ch1.xhtml",
            chapter_xhtml(
                "One",
                r#"<h1 id="arrival">The Arrival</h1><p>She came by sea.</p><img src="../Images/figure%201.png" alt="Figure"/>"#,
            ),
        )
        .file(
            "OEBPS/Text/ch2.xhtml",
            chapter_xhtml("Two", "<h1>The Storm</h1><p>Wind &amp; rain.</p>"),
        )
        .file(
            "OEBPS/Text/ch3.xhtml",
            chapter_xhtml("Three", "<h1>Part Two</h1><p>Morning.</p>"),
        )
        .finish()
}

/// EPUB2 book with an NCX and an EPUB2-style cover meta, package at the
/// archive root.
pub fn epub2_book() -> Vec<u8> {
    let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles><rootfile full-path="content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    let opf = r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="2.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
        <dc:title>Old Maps</dc:title>
        <dc:creator opf:role="aut">R. Quill</dc:creator>
        <meta name="cover" content="cover"/>
    </metadata>
    <manifest>
        <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
        <item id="cover" href="images/cover.png" media-type="image/png"/>
        <item id="intro" href="text/intro.html" media-type="application/xhtml+xml"/>
        <item id="north" href="text/north.html" media-type="application/xhtml+xml"/>
    </manifest>
    <spine toc="ncx">
        <itemref idref="intro"/>
        <itemref idref="north"/>
    </spine>
</package>"#;

    let ncx = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="x"/></head>
  <docTitle><text>Old Maps</text></docTitle>
  <navMap>
    <navPoint id="np1" playOrder="1">
      <navLabel><text>Introduction</text></navLabel>
      <content src="text/intro.html"/>
      <navPoint id="np2" playOrder="2">
        <navLabel><text>Scope</text></navLabel>
        <content src="text/intro.html#scope"/>
      </navPoint>
    </navPoint>
    <navPoint id="np3" playOrder="3">
      <navLabel><text>The North</text></navLabel>
      <content src="text/north.html"/>
    </navPoint>
  </navMap>
  <pageList>
    <pageTarget id="p1" type="normal" value="1" playOrder="4">
      <navLabel><text>1</text></navLabel><content src="text/intro.html#p1"/>
    </pageTarget>
  </pageList>
</ncx>"#;

    ZipBuilder::new()
        .file("mimetype", "application/epub+zip")
        .file("META-INF/container.xml", container)
        .file("content.opf", opf)
        .file("toc.ncx", ncx)
        .file("images/cover.png", b"\x89PNG\r\n\x1a\ncover")
        .file("text/intro.html", chapter_xhtml("Intro", "<p id=\"scope\">Scope.</p>"))
        .file("text/north.html", chapter_xhtml("North", "<p>Cold.</p>"))
        .finish()
}

/// Package without any navigation document.
pub fn epub_without_nav() -> Vec<u8> {
    let opf = r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="3.0" xmlns="http://www.idpf.org/2007/opf">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:title>Loose Leaves</dc:title>
    </metadata>
    <manifest>
        <item id="leaf-a" href="a.xhtml" media-type="application/xhtml+xml"/>
        <item id="leaf-b" href="b.xhtml" media-type="application/xhtml+xml"/>
        <item id="leaf-c" href="c.xhtml" media-type="application/xhtml+xml"/>
    </manifest>
    <spine>
        <itemref idref="leaf-c"/>
        <itemref idref="leaf-a"/>
        <itemref idref="missing"/>
        <itemref idref="leaf-b"/>
    </spine>
</package>"#;

    ZipBuilder::new()
        .file("mimetype", "application/epub+zip")
        .file("META-INF/container.xml", CONTAINER_XML)
        .file("OEBPS/content.opf", opf)
        .file("OEBPS/a.xhtml", chapter_xhtml("A", "<p>a</p>"))
        .file("OEBPS/b.xhtml", chapter_xhtml("B", "<p>b</p>"))
        .file("OEBPS/c.xhtml", chapter_xhtml("C", "<p>c</p>"))
        .finish()
}
